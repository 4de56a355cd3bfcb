mod common;

use attach_flow::{AttachmentId, Size, TagKind};
use attach_flow_view::{
    AttachmentState, AttachmentView, DisplayOptions, MaterializationPolicy, Rect, Replacement,
    ReplacementKind, ViewDiagnostic, ViewError,
};

use common::{collected, collector, sized_images, ScriptedHost};

fn view_with(
    policy: MaterializationPolicy,
    tops: Vec<f32>,
) -> AttachmentView<ScriptedHost> {
    let options = DisplayOptions {
        policy,
        ..DisplayOptions::default()
    };
    AttachmentView::new(ScriptedHost::new(320.0, tops), options)
}

fn ids(view: &AttachmentView<ScriptedHost>) -> Vec<AttachmentId> {
    view.attachments().iter().map(|a| a.id().clone()).collect()
}

fn states(view: &AttachmentView<ScriptedHost>) -> Vec<AttachmentState> {
    ids(view)
        .iter()
        .map(|id| view.state(id).unwrap())
        .collect()
}

#[test]
fn viewport_policy_defers_attachments_below_the_fold() {
    let viewport = Rect::new(0.0, 0.0, 320.0, 250.0);
    let mut view = view_with(
        MaterializationPolicy::Viewport(viewport),
        vec![10.0, 200.0, 500.0],
    );
    let (out, sink) = collector();
    view.set_diagnostic_sink(sink);
    view.set_content(&sized_images(3, 200, 100));

    use AttachmentState::*;
    assert_eq!(states(&view), vec![Materialized, Materialized, Deferred]);
    let ids = ids(&view);
    assert_eq!(view.pending(), &ids[2..]);
    assert_eq!(view.host().attached.len(), 2);
    assert!(collected(&out).contains(&ViewDiagnostic::Deferred {
        id: ids[2].label().to_string()
    }));

    assert_eq!(view.reveal_remaining(), 1);
    assert_eq!(states(&view), vec![Materialized; 3]);
    assert!(view.pending().is_empty());
    assert_eq!(view.host().attached.len(), 3);
    assert_eq!(view.policy(), MaterializationPolicy::Unbounded);
    assert!(collected(&out).contains(&ViewDiagnostic::Revealed { count: 1 }));
}

#[test]
fn revealed_attachments_without_content_end_up_skipped() {
    let viewport = Rect::new(0.0, 0.0, 320.0, 250.0);
    let mut view = view_with(MaterializationPolicy::Viewport(viewport), vec![10.0, 500.0]);
    view.set_content(
        r#"<p>a</p><img src="https://a.test/1.png" width="50" height="50"><p>b</p><audio src="https://a.test/x.mp3"></audio>"#,
    );
    let ids = ids(&view);
    assert_eq!(view.state(&ids[1]), Some(AttachmentState::Deferred));
    assert_eq!(view.pending(), &ids[1..]);

    assert_eq!(view.reveal_remaining(), 0);

    assert_eq!(view.state(&ids[0]), Some(AttachmentState::Materialized));
    assert_eq!(view.state(&ids[1]), Some(AttachmentState::Skipped));
    assert!(view.pending().is_empty());
    assert!(!view.host().attached.contains_key(&ids[1]));

    // a skipped attachment can still be given content explicitly
    view.assign_replacement(&ids[1], Replacement::custom("player", Size::new(100.0, 20.0)))
        .unwrap();
    assert_eq!(view.state(&ids[1]), Some(AttachmentState::Materialized));
}

#[test]
fn max_count_skips_the_tail_until_the_policy_changes() {
    let mut view = view_with(MaterializationPolicy::MaxCount(2), Vec::new());
    view.set_content(&sized_images(5, 200, 100));

    use AttachmentState::*;
    assert_eq!(
        states(&view),
        vec![Materialized, Materialized, Skipped, Skipped, Skipped]
    );
    assert!(view.pending().is_empty());

    // skipped attachments are not deferred, so a reveal leaves them alone
    assert_eq!(view.reveal_remaining(), 0);
    assert_eq!(view.host().attached.len(), 2);

    view.set_policy(MaterializationPolicy::Unbounded);
    assert_eq!(states(&view), vec![Materialized; 5]);
    assert_eq!(view.host().attached.len(), 5);
}

#[test]
fn new_content_restores_the_configured_policy() {
    let mut view = view_with(MaterializationPolicy::MaxCount(1), Vec::new());
    view.set_content(&sized_images(2, 50, 50));
    view.set_policy(MaterializationPolicy::Unbounded);
    assert_eq!(view.policy(), MaterializationPolicy::Unbounded);

    view.set_content(&sized_images(3, 50, 50));
    assert_eq!(view.policy(), MaterializationPolicy::MaxCount(1));
    assert_eq!(view.host().attached.len(), 1);
}

#[test]
fn without_auto_load_or_a_map_nothing_materializes() {
    let options = DisplayOptions {
        auto_load_attachments: false,
        ..DisplayOptions::default()
    };
    let mut view = AttachmentView::new(ScriptedHost::new(320.0, Vec::new()), options);
    view.set_content(&sized_images(2, 50, 50));

    assert_eq!(states(&view), vec![AttachmentState::Skipped; 2]);
    assert!(view.host().attached.is_empty());
    assert!(view.frames().is_empty());
}

#[test]
fn caller_map_takes_precedence_and_falls_through_on_none() {
    let mut view = view_with(MaterializationPolicy::Unbounded, Vec::new());
    view.set_attachment_map(|attachment| match attachment.kind() {
        TagKind::Audio => Some(Replacement::custom("player", Size::new(300.0, 40.0))),
        _ => None,
    });
    view.set_content(
        r#"<audio src="https://a.test/x.mp3"></audio><p>x</p><img src="https://a.test/y.png" width="100" height="50">"#,
    );

    let ids = ids(&view);
    assert_eq!(ids.len(), 2);
    assert_eq!(
        view.replacement_for(&ids[0]).unwrap().kind,
        ReplacementKind::Custom("player".into())
    );
    assert_eq!(
        view.replacement_for(&ids[1]).unwrap().kind,
        ReplacementKind::Image {
            source: "https://a.test/y.png".into()
        }
    );
}

#[test]
fn assign_replacement_swaps_content_and_relayouts() {
    let mut view = view_with(MaterializationPolicy::Unbounded, vec![40.0]);
    view.set_content(r#"<iframe src="https://v.test/1" width="200" height="100"></iframe>"#);
    let id = ids(&view).remove(0);
    let passes = view.layout_passes();

    view.assign_replacement(&id, Replacement::custom("poster", Size::new(200.0, 100.0)))
        .unwrap();

    assert_eq!(view.layout_passes(), passes + 1);
    assert_eq!(view.host().detached, vec![id.clone()]);
    assert_eq!(
        view.replacement_for(&id).unwrap().kind,
        ReplacementKind::Custom("poster".into())
    );
    assert_eq!(view.frame(&id).unwrap().size(), Size::new(200.0, 100.0));
}

#[test]
fn assign_replacement_materializes_a_skipped_attachment() {
    let mut view = view_with(MaterializationPolicy::Unbounded, Vec::new());
    view.set_content(r#"<audio src="https://a.test/x.mp3"></audio>"#);
    let id = ids(&view).remove(0);
    assert_eq!(view.state(&id), Some(AttachmentState::Skipped));

    view.assign_replacement(&id, Replacement::custom("player", Size::new(100.0, 20.0)))
        .unwrap();
    assert_eq!(view.state(&id), Some(AttachmentState::Materialized));
    assert!(view.host().attached.contains_key(&id));
    assert!(view.attachments()[0].is_materialized());
}

#[test]
fn unknown_identifiers_are_rejected() {
    let mut view = view_with(MaterializationPolicy::Unbounded, Vec::new());
    view.set_content("<p>plain</p>");
    let stray = AttachmentId::placeholder(TagKind::Image, 9);

    let err = view
        .assign_replacement(&stray, Replacement::custom("x", Size::new(1.0, 1.0)))
        .unwrap_err();
    assert_eq!(err, ViewError::UnknownAttachment(stray.clone()));
    assert_eq!(err.code(), "VIEW_UNKNOWN_ATTACHMENT");
    assert!(view
        .resolve_natural_size(&stray, Size::new(10.0, 10.0))
        .is_err());
}

#[test]
fn reset_detaches_everything_and_withdraws_exclusions() {
    let mut view = view_with(MaterializationPolicy::Unbounded, vec![0.0, 100.0]);
    view.host_mut().exclusions.push(Rect::new(1.0, 1.0, 1.0, 1.0));
    view.set_content(&sized_images(2, 100, 50));
    let ids = ids(&view);
    assert_eq!(view.host().exclusions.len(), 3);

    view.reset();

    assert!(view.host().attached.is_empty());
    assert_eq!(view.host().exclusions, vec![Rect::new(1.0, 1.0, 1.0, 1.0)]);
    assert!(view.attachments().is_empty());
    assert!(view.frames().is_empty());
    assert_eq!(view.state(&ids[0]), Some(AttachmentState::Destroyed));
}
