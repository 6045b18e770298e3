//! Link graph integration tests: links, traversal, cascades, notifications

mod common;

use common::{store, test_instance};

use mnemo::graph::{CascadeKind, CreateLinkRequest};
use mnemo::types::*;
use mnemo::MnemoError;

#[tokio::test]
async fn test_bidirectional_link_type_reversal() {
    // parent link created bidirectionally yields exactly (P,C,parent) and
    // (C,P,child)
    let mnemo = test_instance();
    let parent = store(&mnemo, "parent entry").await;
    let child = store(&mnemo, "child entry").await;

    let mut req = CreateLinkRequest::new(&parent.id, &child.id);
    req.link_type = LinkType::Parent;
    req.bidirectional = true;
    mnemo.graph.create_link(req).await.unwrap();

    let links = mnemo
        .graph
        .get_links(&parent.id, LinkDirection::Both, None)
        .await
        .unwrap();
    assert_eq!(links.len(), 2);

    let forward = links
        .iter()
        .find(|l| l.source_id == parent.id)
        .expect("forward link");
    assert_eq!(forward.link_type, LinkType::Parent);
    assert_eq!(forward.target_id, child.id);

    let reverse = links
        .iter()
        .find(|l| l.source_id == child.id)
        .expect("reverse link");
    assert_eq!(reverse.link_type, LinkType::Child);
    assert_eq!(reverse.target_id, parent.id);
}

#[tokio::test]
async fn test_link_validation() {
    let mnemo = test_instance();
    let a = store(&mnemo, "entry a").await;
    let b = store(&mnemo, "entry b").await;

    // Self-link
    let self_link = mnemo
        .graph
        .create_link(CreateLinkRequest::new(&a.id, &a.id))
        .await;
    assert!(matches!(self_link, Err(MnemoError::Validation(_))));

    // Strength out of range
    let mut bad_strength = CreateLinkRequest::new(&a.id, &b.id);
    bad_strength.strength = 1.5;
    assert!(matches!(
        mnemo.graph.create_link(bad_strength).await,
        Err(MnemoError::Validation(_))
    ));

    // Missing endpoint
    let missing = mnemo
        .graph
        .create_link(CreateLinkRequest::new(&a.id, "nonexistent-id"))
        .await;
    assert!(matches!(missing, Err(MnemoError::NotFound(_))));

    // Duplicate (source, target, type)
    mnemo
        .graph
        .create_link(CreateLinkRequest::new(&a.id, &b.id))
        .await
        .unwrap();
    let duplicate = mnemo
        .graph
        .create_link(CreateLinkRequest::new(&a.id, &b.id))
        .await;
    assert!(matches!(duplicate, Err(MnemoError::Conflict(_))));

    // A different type between the same pair is fine
    let mut other_type = CreateLinkRequest::new(&a.id, &b.id);
    other_type.link_type = LinkType::Reference;
    assert!(mnemo.graph.create_link(other_type).await.is_ok());
}

#[tokio::test]
async fn test_delete_link_both_directions() {
    let mnemo = test_instance();
    let a = store(&mnemo, "node a").await;
    let b = store(&mnemo, "node b").await;

    let mut req = CreateLinkRequest::new(&a.id, &b.id);
    req.bidirectional = true;
    mnemo.graph.create_link(req).await.unwrap();

    let deleted = mnemo.graph.delete_link(&a.id, &b.id, None).await.unwrap();
    assert_eq!(deleted, 2);

    let links = mnemo
        .graph
        .get_links(&a.id, LinkDirection::Both, None)
        .await
        .unwrap();
    assert!(links.is_empty());
}

#[tokio::test]
async fn test_bfs_traversal_depths_nondecreasing() {
    // a - b - c - d chain plus a - e
    let mnemo = test_instance();
    let a = store(&mnemo, "node a").await;
    let b = store(&mnemo, "node b").await;
    let c = store(&mnemo, "node c").await;
    let d = store(&mnemo, "node d").await;
    let e = store(&mnemo, "node e").await;

    for (src, dst) in [(&a, &b), (&b, &c), (&c, &d), (&a, &e)] {
        mnemo
            .graph
            .create_link(CreateLinkRequest::new(&src.id, &dst.id))
            .await
            .unwrap();
    }

    let results = mnemo.graph.traverse(&a.id, 3, 50, None).await.unwrap();

    let depths: Vec<usize> = results.iter().map(|(_, node)| node.depth).collect();
    assert!(depths.windows(2).all(|w| w[0] <= w[1]), "depths sorted");

    // Every node visited once
    let mut ids: Vec<&str> = results.iter().map(|(m, _)| m.id.as_str()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), results.len());
    assert_eq!(results.len(), 4);

    // Edges are undirected for expansion: traversal from d reaches a
    let reverse = mnemo.graph.traverse(&d.id, 3, 50, None).await.unwrap();
    assert!(reverse.iter().any(|(m, _)| m.id == a.id));
}

#[tokio::test]
async fn test_traversal_edge_cases() {
    let mnemo = test_instance();
    let a = store(&mnemo, "solitary node").await;

    // Depth zero yields nothing
    let empty = mnemo.graph.traverse(&a.id, 0, 50, None).await.unwrap();
    assert!(empty.is_empty());

    // Missing start is a validation error
    let missing = mnemo.graph.traverse("missing-id", 3, 50, None).await;
    assert!(matches!(missing, Err(MnemoError::Validation(_))));
}

#[tokio::test]
async fn test_traversal_link_type_filter() {
    let mnemo = test_instance();
    let a = store(&mnemo, "root node").await;
    let b = store(&mnemo, "referenced node").await;
    let c = store(&mnemo, "related node").await;

    let mut ref_link = CreateLinkRequest::new(&a.id, &b.id);
    ref_link.link_type = LinkType::Reference;
    mnemo.graph.create_link(ref_link).await.unwrap();
    mnemo
        .graph
        .create_link(CreateLinkRequest::new(&a.id, &c.id))
        .await
        .unwrap();

    let only_refs = mnemo
        .graph
        .traverse(&a.id, 2, 50, Some(&[LinkType::Reference]))
        .await
        .unwrap();

    assert_eq!(only_refs.len(), 1);
    assert_eq!(only_refs[0].0.id, b.id);
}

#[tokio::test]
async fn test_cycle_detection() {
    // A -> B -> C -> A with cascade_on_update; the analysis reports the
    // cycle containing all three
    let mnemo = test_instance();
    let a = store(&mnemo, "cycle node a").await;
    let b = store(&mnemo, "cycle node b").await;
    let c = store(&mnemo, "cycle node c").await;

    for (src, dst) in [(&a, &b), (&b, &c), (&c, &a)] {
        let mut req = CreateLinkRequest::new(&src.id, &dst.id);
        req.link_type = LinkType::DependsOn;
        req.cascade_on_update = true;
        mnemo.graph.create_link(req).await.unwrap();
    }

    let analysis = mnemo
        .graph
        .analyze_impact(&a.id, CascadeKind::Update, 5)
        .await
        .unwrap();

    assert!(analysis.has_cycles);
    let cycle = &analysis.cycle_paths[0];
    for id in [&a.id, &b.id, &c.id] {
        assert!(cycle.contains(id), "cycle must contain {}", id);
    }

    // B and C are affected; the source itself is excluded
    assert_eq!(analysis.total_affected, 2);
    assert!(analysis.affected.iter().all(|m| m.memory_id != a.id));
}

#[tokio::test]
async fn test_diamond_reports_every_simple_cycle() {
    // A->B, A->C, B->D, C->D, D->A: two simple cycles share the node D.
    // Both must be reported even though D is first expanded via B.
    let mnemo = test_instance();
    let a = store(&mnemo, "diamond node a").await;
    let b = store(&mnemo, "diamond node b").await;
    let c = store(&mnemo, "diamond node c").await;
    let d = store(&mnemo, "diamond node d").await;

    for (src, dst) in [(&a, &b), (&a, &c), (&b, &d), (&c, &d), (&d, &a)] {
        let mut req = CreateLinkRequest::new(&src.id, &dst.id);
        req.link_type = LinkType::DependsOn;
        req.cascade_on_update = true;
        mnemo.graph.create_link(req).await.unwrap();
    }

    let analysis = mnemo
        .graph
        .analyze_impact(&a.id, CascadeKind::Update, 5)
        .await
        .unwrap();

    assert!(analysis.has_cycles);
    assert_eq!(analysis.cycle_paths.len(), 2, "both diamond cycles reported");

    let through_b = analysis
        .cycle_paths
        .iter()
        .find(|cycle| cycle.contains(&b.id))
        .expect("cycle through b");
    let through_c = analysis
        .cycle_paths
        .iter()
        .find(|cycle| cycle.contains(&c.id))
        .expect("cycle through c");
    for cycle in [through_b, through_c] {
        assert!(cycle.contains(&a.id));
        assert!(cycle.contains(&d.id));
    }

    // B, C, D affected exactly once each
    assert_eq!(analysis.total_affected, 3);
    let mut affected_ids: Vec<&str> = analysis
        .affected
        .iter()
        .map(|m| m.memory_id.as_str())
        .collect();
    affected_ids.sort();
    affected_ids.dedup();
    assert_eq!(affected_ids.len(), 3);
}

#[tokio::test]
async fn test_impact_follows_only_flagged_edges() {
    let mnemo = test_instance();
    let a = store(&mnemo, "impact a").await;
    let b = store(&mnemo, "impact b").await;
    let c = store(&mnemo, "impact c").await;

    let mut cascading = CreateLinkRequest::new(&a.id, &b.id);
    cascading.cascade_on_update = true;
    cascading.strength = 0.8;
    mnemo.graph.create_link(cascading).await.unwrap();

    // Plain link without the flag is not followed
    mnemo
        .graph
        .create_link(CreateLinkRequest::new(&a.id, &c.id))
        .await
        .unwrap();

    let analysis = mnemo
        .graph
        .analyze_impact(&a.id, CascadeKind::Update, 5)
        .await
        .unwrap();

    assert_eq!(analysis.total_affected, 1);
    assert_eq!(analysis.affected[0].memory_id, b.id);
    assert_eq!(analysis.affected[0].depth, 1);
    assert!((analysis.affected[0].strength - 0.8).abs() < 1e-6);
    assert!(!analysis.has_cycles);

    // Delete-cascade sees nothing here
    let delete_analysis = mnemo
        .graph
        .analyze_impact(&a.id, CascadeKind::Delete, 5)
        .await
        .unwrap();
    assert_eq!(delete_analysis.total_affected, 0);
}

#[tokio::test]
async fn test_propagate_and_notifications() {
    let mnemo = test_instance();
    let a = store(&mnemo, "source of truth").await;
    let b = store(&mnemo, "derived summary").await;
    let c = store(&mnemo, "derived index").await;

    for target in [&b, &c] {
        let mut req = CreateLinkRequest::new(&a.id, &target.id);
        req.link_type = LinkType::DerivedFrom;
        req.cascade_on_update = true;
        mnemo.graph.create_link(req).await.unwrap();
    }

    let result = mnemo
        .graph
        .propagate_update(&a.id, NotificationType::Update, None)
        .await
        .unwrap();
    assert_eq!(result.notifications_created, 2);
    assert_eq!(result.affected_count, 2);

    let pending = mnemo.graph.get_pending_notifications(&b.id).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].source_id, a.id);
    assert_eq!(pending[0].notification_type, NotificationType::Update);
    assert!(pending[0].processed_at.is_none());

    mnemo.graph.mark_processed(&pending[0].id).await.unwrap();
    let after = mnemo.graph.get_pending_notifications(&b.id).await.unwrap();
    assert!(after.is_empty());

    // Unknown notification id
    assert!(matches!(
        mnemo.graph.mark_processed("no-such-notification").await,
        Err(MnemoError::NotFound(_))
    ));
}
