//! Scenario tests for the synchronous engine

use approx::assert_relative_eq;
use owlmap_engine::*;

fn bounds() -> BoundingBox {
    BoundingBox::new(0.0, 52.0, 0.3, 52.3)
}

fn castle() -> KnowledgeRecord {
    KnowledgeRecord::new("Q1", "Ely Castle")
        .with_type("T1")
        .with_coord(52.1, 0.1)
}

fn mill() -> KnowledgeRecord {
    KnowledgeRecord::new("Q3", "Windmill")
        .with_type("T2")
        .with_coord(52.2, 0.2)
}

fn load(engine: &mut MapEngine, knowledge: KnowledgePage, geo: GeoPage) -> Vec<MapEvent> {
    let (cycle, mut events) = engine.begin_load(bounds());
    events.extend(engine.apply_knowledge(cycle, Ok(knowledge)).events);
    events.extend(engine.apply_geo(cycle, Ok(geo)).events);
    events
}

// ============================================================================
// Loading
// ============================================================================

#[test]
fn test_single_unlinked_castle() {
    let mut engine = MapEngine::default();
    load(
        &mut engine,
        KnowledgePage::new(vec![castle()], vec![TypeFacetCount::new("T1", "Castle", 1)]),
        GeoPage::default(),
    );

    assert_eq!(engine.link_status(&"Q1".into()), Some(LinkStatus::Unlinked));
    assert_eq!(
        engine.facet_snapshot(),
        vec![TypeFacet {
            type_id: "T1".into(),
            label: "Castle".to_string(),
            count: 1
        }]
    );
    assert!(engine.is_shown(&"Q1".into()));
}

#[test]
fn test_geo_before_knowledge_requests_one_batch() {
    let mut engine = MapEngine::default();
    let (cycle, _) = engine.begin_load(bounds());

    let geo = GeoPage::new(vec![
        GeoRecord::new("way/5", "Q2", LatLon::new(52.1, 0.1)),
        GeoRecord::new("node/9", "Q4", LatLon::new(52.15, 0.1)),
    ]);
    let step = engine.apply_geo(cycle, Ok(geo));
    assert!(step.resolution.is_none());
    assert_eq!(
        engine.link_status(&"Q2".into()),
        Some(LinkStatus::GeoOnlyUnresolved)
    );

    let step = engine.apply_knowledge(cycle, Ok(KnowledgePage::default()));
    assert!(step.both_loaded);
    let request = step.resolution.expect("one batched request");
    assert_eq!(request.ids, vec![EntityId::from("Q2"), EntityId::from("Q4")]);
    assert!(step
        .events
        .iter()
        .any(|e| matches!(e, MapEvent::ResolutionRequested { ids, .. } if ids.len() == 2)));
    assert_eq!(engine.link_status(&"Q2".into()), Some(LinkStatus::Orphaned));
}

#[test]
fn test_resolution_links_and_does_not_recurse() {
    let mut engine = MapEngine::default();
    let (cycle, _) = engine.begin_load(bounds());
    engine.apply_geo(
        cycle,
        Ok(GeoPage::new(vec![GeoRecord::new(
            "way/5",
            "Q2",
            LatLon::new(52.1, 0.1),
        )])),
    );
    let request = engine
        .apply_knowledge(cycle, Ok(KnowledgePage::default()))
        .resolution
        .unwrap();

    let response = KnowledgePage::new(
        vec![
            KnowledgeRecord::new("Q2", "Old Mill").with_type("T2"),
            KnowledgeRecord::new("Q8", "Unasked").with_type("T2"),
        ],
        vec![TypeFacetCount::new("T2", "Mill", 2)],
    );
    let step = engine.apply_resolution(&request, Ok(response));

    let outcome = step.outcome.unwrap();
    assert_eq!(outcome.resolved, vec![EntityId::from("Q2"), EntityId::from("Q8")]);
    assert_eq!(outcome.unrequested, vec![EntityId::from("Q8")]);
    assert!(step.resolution.is_none());
    assert_eq!(engine.link_status(&"Q2".into()), Some(LinkStatus::Linked));
    assert!(engine.is_shown(&"Q2".into()));
    assert_eq!(engine.facet_snapshot()[0].count, 2);
    assert_eq!(engine.facet_snapshot()[0].label, "Mill");
}

#[test]
fn test_overlapping_viewports_do_not_double_count() {
    let mut engine = MapEngine::default();
    let page = || KnowledgePage::new(vec![castle(), mill()], vec![]);
    load(&mut engine, page(), GeoPage::default());
    load(&mut engine, page(), GeoPage::default());

    let snapshot = engine.facet_snapshot();
    assert!(snapshot.iter().all(|f| f.count == 1));
    assert_eq!(engine.summary().unlinked, 2);
}

#[test]
fn test_stale_cycle_merges_without_firing_edge() {
    let mut engine = MapEngine::default();
    let (old, _) = engine.begin_load(bounds());
    let (current, _) = engine.begin_load(bounds());

    let step = engine.apply_knowledge(old, Ok(KnowledgePage::new(vec![castle()], vec![])));
    assert!(!step.both_loaded);
    let step = engine.apply_geo(old, Ok(GeoPage::default()));
    assert!(!step.both_loaded);
    assert!(engine.is_shown(&"Q1".into()));
    assert!(engine.is_loading());

    engine.apply_knowledge(current, Ok(KnowledgePage::default()));
    let step = engine.apply_geo(current, Ok(GeoPage::default()));
    assert!(step.both_loaded);
}

#[test]
fn test_late_resolution_only_settles_its_own_ids() {
    let mut engine = MapEngine::default();
    let (old, _) = engine.begin_load(bounds());
    engine.apply_geo(
        old,
        Ok(GeoPage::new(vec![GeoRecord::new("way/5", "Q2", LatLon::new(52.1, 0.1))])),
    );
    let request = engine
        .apply_knowledge(old, Ok(KnowledgePage::default()))
        .resolution
        .unwrap();

    // The next cycle's geo page lands before the by-id reply for the last one.
    let (current, _) = engine.begin_load(bounds());
    engine.apply_geo(
        current,
        Ok(GeoPage::new(vec![GeoRecord::new("way/7", "Q7", LatLon::new(52.2, 0.2))])),
    );
    engine.apply_resolution(&request, Ok(KnowledgePage::default()));

    assert_eq!(engine.link_status(&"Q2".into()), Some(LinkStatus::Orphaned));
    assert_eq!(
        engine.link_status(&"Q7".into()),
        Some(LinkStatus::GeoOnlyUnresolved)
    );

    let step = engine.apply_knowledge(current, Ok(KnowledgePage::default()));
    assert!(step.both_loaded);
    assert_eq!(engine.link_status(&"Q7".into()), Some(LinkStatus::Orphaned));
}

#[test]
fn test_failed_fetch_keeps_loading_indicator() {
    let mut engine = MapEngine::default();
    let (cycle, _) = engine.begin_load(bounds());
    let step = engine.apply_knowledge(cycle, Err(FetchError::Status {
        status: 502,
        url: "https://owl.example.org/api/1/items".into(),
    }));
    assert!(step
        .events
        .iter()
        .any(|e| matches!(e, MapEvent::FetchFailed { query: Query::KnowledgeInBounds, .. })));

    let geo = GeoPage::new(vec![GeoRecord::new("way/5", "Q2", LatLon::new(52.1, 0.1))]);
    let step = engine.apply_geo(cycle, Ok(geo));
    assert!(!step.both_loaded);
    assert!(step.resolution.is_none());
    assert!(engine.is_loading());
    assert_eq!(
        engine.link_status(&"Q2".into()),
        Some(LinkStatus::GeoOnlyUnresolved)
    );
}

// ============================================================================
// Filtering
// ============================================================================

#[test]
fn test_empty_type_selection_hides_typed_entities() {
    let mut engine = MapEngine::default();
    load(
        &mut engine,
        KnowledgePage::new(vec![castle(), mill()], vec![]),
        GeoPage::default(),
    );

    let selection = FilterSelection::with_types(Vec::<TypeId>::new());
    assert!(!selection.is_master_off());
    let diff = engine.set_selection(selection);
    assert_eq!(diff.removed, vec![EntityId::from("Q1"), EntityId::from("Q3")]);
    assert!(engine.visible_ids().is_empty());
}

#[test]
fn test_only_and_all_types() {
    let mut engine = MapEngine::default();
    load(
        &mut engine,
        KnowledgePage::new(vec![castle(), mill()], vec![]),
        GeoPage::default(),
    );

    let diff = engine.select_only_type("T2".into());
    assert_eq!(diff.removed, vec![EntityId::from("Q1")]);
    assert!(diff.added.is_empty());

    let diff = engine.select_all_types();
    assert_eq!(diff.added, vec![EntityId::from("Q1")]);
    assert_eq!(engine.visible_ids().len(), 2);
}

#[test]
fn test_toggle_from_all_keeps_other_types() {
    let mut engine = MapEngine::default();
    load(
        &mut engine,
        KnowledgePage::new(vec![castle(), mill()], vec![]),
        GeoPage::default(),
    );

    engine.toggle_type(&"T1".into());
    assert_eq!(engine.visible_ids(), vec![EntityId::from("Q3")]);
    engine.toggle_type(&"T1".into());
    assert_eq!(engine.visible_ids().len(), 2);
}

#[test]
fn test_link_toggles() {
    let mut engine = MapEngine::default();
    load(
        &mut engine,
        KnowledgePage::new(vec![castle(), mill()], vec![]),
        GeoPage::new(vec![GeoRecord::new("way/1", "Q1", LatLon::new(52.1, 0.1))]),
    );
    assert_eq!(engine.link_status(&"Q1".into()), Some(LinkStatus::Linked));

    let diff = engine.set_show_linked(false);
    assert_eq!(diff.removed, vec![EntityId::from("Q1")]);

    engine.set_show_linked(true);
    let diff = engine.set_show_unlinked(false);
    assert_eq!(diff.removed, vec![EntityId::from("Q3")]);

    engine.set_show_linked(false);
    assert!(engine.visible_ids().is_empty());
}

#[test]
fn test_new_types_follow_all_mode_only() {
    let mut engine = MapEngine::default();
    let (cycle, _) = engine.begin_load(bounds());
    engine.select_only_type("T1".into());
    engine.apply_knowledge(cycle, Ok(KnowledgePage::new(vec![castle(), mill()], vec![])));
    assert!(engine.is_shown(&"Q1".into()));
    assert!(!engine.is_shown(&"Q3".into()));

    engine.select_all_types();
    assert!(engine.is_shown(&"Q3".into()));
}

#[test]
fn test_new_load_ticks_every_type() {
    let mut engine = MapEngine::default();
    load(
        &mut engine,
        KnowledgePage::new(vec![castle(), mill()], vec![]),
        GeoPage::default(),
    );
    engine.select_only_type("T1".into());
    engine.set_show_linked(false);
    assert!(!engine.is_shown(&"Q3".into()));

    let (_, events) = engine.begin_load(bounds());
    assert_eq!(engine.selection().types, TypeSelection::All);
    assert!(!engine.selection().show_linked);
    assert!(engine.is_shown(&"Q3".into()));
    assert!(events.iter().any(|e| matches!(
        e,
        MapEvent::VisibilityChanged { diff } if diff.added == vec![EntityId::from("Q3")]
    )));
}

// ============================================================================
// Markers and link lines
// ============================================================================

#[test]
fn test_markers_and_segments() {
    let mut engine = MapEngine::default();
    load(
        &mut engine,
        KnowledgePage::new(vec![castle(), mill()], vec![]),
        GeoPage::new(vec![
            GeoRecord::new("way/1", "Q1", LatLon::new(52.1005, 0.1002)),
            GeoRecord::new("node/2", "Q7", LatLon::new(52.0, 0.0)),
        ]),
    );

    let linked = engine.entity(&"Q1".into()).unwrap();
    assert_eq!(linked.knowledge_marker(), Some(MarkerRole::ItemLinked));
    assert_eq!(linked.geo_marker(), Some(MarkerRole::GeoMatched));
    let segments = linked.link_segments();
    assert_eq!(segments.len(), 1);
    assert_relative_eq!(segments[0].1.lat, 52.1005);
    assert_relative_eq!(segments[0].0.lon, 0.1);

    let unlinked = engine.entity(&"Q3".into()).unwrap();
    assert_eq!(unlinked.knowledge_marker(), Some(MarkerRole::ItemUnlinked));
    assert!(unlinked.link_segments().is_empty());

    let orphan = engine.entity(&"Q7".into()).unwrap();
    assert_eq!(orphan.knowledge_marker(), None);
    assert_eq!(orphan.geo_marker(), Some(MarkerRole::GeoUnmatched));
}

// ============================================================================
// Detail session
// ============================================================================

#[test]
fn test_detail_lookup_sequence() {
    let mut engine = MapEngine::default();
    load(
        &mut engine,
        KnowledgePage::new(vec![castle()], vec![]),
        GeoPage::new(vec![GeoRecord::new("way/1", "Q9", LatLon::new(52.1, 0.1))]),
    );

    let (outcome, _) = engine.focus("Q1".into()).unwrap();
    let ticket = outcome.ticket().clone();

    engine
        .apply_tags(
            &ticket,
            Ok(EntityTags {
                id: "Q1".into(),
                tags: vec!["Key:historic".into()],
            }),
        )
        .unwrap();

    let list = CandidateList {
        id: "Q1".into(),
        candidates: vec![
            Candidate::new("way/1", 12.0),
            Candidate::new("way/3", 40.0)
                .with_preset(Preset::new("Tag:historic=castle", "Castle")),
            Candidate::new("node/4", 8.5),
        ],
        max_distance: Some(400.0),
    };
    let events = engine.apply_candidates(&ticket, Ok(list)).unwrap();
    let MapEvent::DetailCandidatesReady { candidates, .. } = &events[0] else {
        panic!("expected candidates event");
    };

    let ids: Vec<&str> = candidates.iter().map(|c| c.identifier.as_str()).collect();
    assert_eq!(ids, vec!["node/4", "way/3"]);
    assert_eq!(candidates[1].matched_presets.len(), 1);
    assert!(matches!(
        engine.detail_state(),
        DetailState::OpenWithCandidates { .. }
    ));
}

#[test]
fn test_focus_unknown_is_refused() {
    let mut engine = MapEngine::default();
    load(
        &mut engine,
        KnowledgePage::default(),
        GeoPage::new(vec![GeoRecord::new("way/5", "Q2", LatLon::new(52.1, 0.1))]),
    );

    let err = engine.focus("Q2".into()).unwrap_err();
    assert_eq!(err, EngineError::UnknownFocusTarget("Q2".into()));
    assert_eq!(engine.detail_state(), &DetailState::Closed);
}

#[test]
fn test_failed_lookup_after_refocus_is_stale() {
    let mut engine = MapEngine::default();
    load(
        &mut engine,
        KnowledgePage::new(vec![castle(), mill()], vec![]),
        GeoPage::default(),
    );

    let (first, _) = engine.focus("Q1".into()).unwrap();
    engine.focus("Q3".into()).unwrap();

    let err = engine
        .apply_tags(first.ticket(), Err(FetchError::Network("reset".into())))
        .unwrap_err();
    assert!(err.is_stale());
}

#[test]
fn test_close_detail_emits_once() {
    let mut engine = MapEngine::default();
    load(
        &mut engine,
        KnowledgePage::new(vec![castle()], vec![]),
        GeoPage::default(),
    );
    engine.focus("Q1".into()).unwrap();

    assert_eq!(
        engine.close_detail(),
        vec![MapEvent::DetailClosed { id: "Q1".into() }]
    );
    assert!(engine.close_detail().is_empty());
}
