use super::super::Recorder;
use livedb::{fields, materialize, row, Change, ChangeKind, MemCollection, Plan};
use std::rc::Rc;

pub fn test() {
    let people = MemCollection::keyed_by("Person", "id");
    people.insert_row(row! { "id" => "1", "name" => "a" }).unwrap();

    let mut plan = Plan::new();
    let p = plan.collection(people.clone());
    let query = plan
        .query(|q| {
            let p = q.from(p);
            let name = q.upper(p.get("name"));
            q.select(fields! { name: name });
        })
        .unwrap();
    let live = materialize(&Rc::new(plan), query).unwrap();

    let early = Recorder::default();
    let early_sub = early.attach(&live);
    people.insert_row(row! { "id" => "2", "name" => "b" }).unwrap();
    assert_eq!(early.batches().len(), 2);

    // a late subscriber starts from the current rows
    let late = Recorder::default();
    let _late_sub = late.attach(&live);
    assert_eq!(
        late.batches(),
        vec![vec![
            Change::insert("1", row! { "name" => "A" }),
            Change::insert("2", row! { "name" => "B" }),
        ]]
    );

    early_sub.unsubscribe();
    people.delete("1").unwrap();
    assert_eq!(early.batches().len(), 2);
    let last = late.batches().pop().unwrap();
    assert_eq!(last.len(), 1);
    assert_eq!(last[0].kind, ChangeKind::Delete);
    assert_eq!(late.replayed(), live.rows());
    assert_eq!(people.subscriber_count(), 1);
}
