use super::super::Recorder;
use livedb::{fields, materialize, row, Change, MemCollection, Plan, RowKey};
use std::rc::Rc;

pub fn test() {
    let messages = MemCollection::keyed_by("Messages", "id");
    for (id, conversation) in [(1, "c1"), (2, "c1"), (3, "c2"), (4, "c3")] {
        messages
            .insert_row(row! { "id" => id, "conversationId" => conversation, "text" => "hello" })
            .unwrap();
    }

    let mut plan = Plan::new();
    let m = plan.collection(messages.clone());
    let query = plan
        .query(|q| {
            let m = q.from(m);
            let count = q.count_all();
            q.select(fields! { conversationId: m.get("conversationId"), count: count })
                .group_by([m.get("conversationId")]);
        })
        .unwrap();

    let live = materialize(&Rc::new(plan), query).unwrap();
    let recorder = Recorder::default();
    let _sub = recorder.attach(&live);
    assert_eq!(live.rows().len(), 3);
    recorder.clear();

    messages
        .insert_row(row! { "id" => 5, "conversationId" => "c1", "text" => "again" })
        .unwrap();
    assert_eq!(
        recorder.batches(),
        vec![vec![Change::update(
            RowKey::from("c1"),
            row! { "conversationId" => "c1", "count" => 3 }
        )]]
    );
    recorder.clear();

    // moving the last message of c3 removes its group
    messages
        .update(4, row! { "id" => 4, "conversationId" => "c2", "text" => "moved" })
        .unwrap();
    assert_eq!(
        recorder.batches(),
        vec![vec![
            Change::delete(RowKey::from("c3"), row! { "conversationId" => "c3", "count" => 1 }),
            Change::update(RowKey::from("c2"), row! { "conversationId" => "c2", "count" => 2 }),
        ]]
    );
}
