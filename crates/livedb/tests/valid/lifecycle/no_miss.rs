use super::super::Recorder;
use livedb::{fields, materialize_with, row, ChangeKind, LiveOptions, MemCollection, Plan, Status};
use std::rc::Rc;

pub fn test() {
    let messages = MemCollection::keyed_by("Messages", "id");
    messages.insert_row(row! { "id" => 1, "text" => "a" }).unwrap();

    let mut plan = Plan::new();
    let m = plan.collection(messages.clone());
    let query = plan
        .query(|q| {
            let m = q.from(m);
            q.select(fields! { text: m.get("text") });
        })
        .unwrap();
    let plan = Rc::new(plan);

    // output between preloading and the first subscription is buffered
    let buffered = materialize_with(
        &plan,
        query,
        LiveOptions {
            start_preloaded: true,
            ..LiveOptions::default()
        },
    )
    .unwrap();
    assert_eq!(buffered.status(), Status::Ready);
    messages.insert_row(row! { "id" => 2, "text" => "b" }).unwrap();
    messages.update(1, row! { "id" => 1, "text" => "a!" }).unwrap();
    messages.delete(2).unwrap();

    let recorder = Recorder::default();
    let _sub = recorder.attach(&buffered);
    let kinds: Vec<ChangeKind> = recorder.changes().iter().map(|c| c.kind).collect();
    assert_eq!(
        kinds,
        vec![ChangeKind::Insert, ChangeKind::Insert, ChangeKind::Update, ChangeKind::Delete]
    );
    assert_eq!(recorder.batches().len(), 1);
    assert_eq!(recorder.replayed(), buffered.rows());
    assert_eq!(buffered.rows(), vec![row! { "text" => "a!" }]);

    // without buffering the first subscriber starts from the current rows
    let unbuffered = materialize_with(
        &plan,
        query,
        LiveOptions {
            start_preloaded: true,
            buffer_until_subscribed: false,
            ..LiveOptions::default()
        },
    )
    .unwrap();
    messages.insert_row(row! { "id" => 3, "text" => "c" }).unwrap();
    let recorder = Recorder::default();
    let _sub = recorder.attach(&unbuffered);
    assert!(recorder.changes().iter().all(|c| c.kind == ChangeKind::Insert));
    assert_eq!(recorder.replayed(), unbuffered.rows());
    assert_eq!(unbuffered.rows().len(), 2);

    messages.delete(3).unwrap();
    assert_eq!(recorder.replayed(), unbuffered.rows());
    assert_eq!(recorder.replayed(), buffered.rows());
}
