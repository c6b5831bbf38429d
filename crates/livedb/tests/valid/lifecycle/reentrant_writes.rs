use super::super::Recorder;
use livedb::{fields, materialize, row, Change, MemCollection, Plan, RowKey};
use std::rc::Rc;

pub fn test() {
    let tasks = MemCollection::new("Tasks");

    let mut plan = Plan::new();
    let t = plan.collection(tasks.clone());
    let query = plan
        .query(|q| {
            let t = q.from(t);
            let open = q.eq(t.get("status"), "open");
            q.filter(open);
            q.select(fields! { title: t.get("title") });
        })
        .unwrap();
    let live = materialize(&Rc::new(plan), query).unwrap();

    // every new parent task gets a follow up, written from the subscriber
    let _writer = {
        let tasks = tasks.clone();
        live.subscribe_changes(move |changes| {
            for change in changes {
                if change.key == RowKey::from("t1") {
                    tasks
                        .insert("t1-followup", row! { "title" => "follow up", "status" => "open" })
                        .unwrap();
                }
            }
        })
        .unwrap()
    };
    let recorder = Recorder::default();
    let _sub = recorder.attach(&live);

    tasks
        .insert("t1", row! { "title" => "parent", "status" => "open" })
        .unwrap();

    // the follow up is processed as its own batch, after the parent's batch
    // reached every subscriber
    assert_eq!(
        recorder.batches(),
        vec![
            vec![Change::insert("t1", row! { "title" => "parent" })],
            vec![Change::insert("t1-followup", row! { "title" => "follow up" })],
        ]
    );
    assert_eq!(tasks.len(), 2);
    assert_eq!(live.rows().len(), 2);
}
