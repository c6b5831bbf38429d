use super::super::Recorder;
use livedb::{fields, materialize, row, Change, JoinKind, MemCollection, Plan, RowKey};
use std::rc::Rc;

pub fn test() {
    let people = MemCollection::keyed_by("Person", "id");
    let ages = MemCollection::keyed_by("PersonAge", "person");
    people.insert_row(row! { "id" => "1", "name" => "a" }).unwrap();
    people.insert_row(row! { "id" => "2", "name" => "b" }).unwrap();
    ages.insert_row(row! { "person" => "1", "age" => 30 }).unwrap();
    ages.insert_row(row! { "person" => "2", "age" => 40 }).unwrap();

    let mut plan = Plan::new();
    let person = plan.collection(people.clone());
    let person_age = plan.collection(ages.clone());
    let query = plan
        .query(|q| {
            let p = q.from(person);
            let a = q.join_fields(person_age, JoinKind::Inner, [("person", p.get("id"))]);
            let old = q.gt(a.get("age"), 35);
            q.filter(old);
            q.select(fields! { id: p.get("id"), name: p.get("name") });
        })
        .unwrap();

    let live = materialize(&Rc::new(plan), query).unwrap();
    let recorder = Recorder::default();
    let _sub = recorder.attach(&live);
    assert_eq!(live.rows(), vec![row! { "id" => "2", "name" => "b" }]);
    assert_eq!(recorder.replayed(), live.rows());
    recorder.clear();

    // person 1 passes the filter
    ages.update("1", row! { "person" => "1", "age" => 50 }).unwrap();
    assert_eq!(
        recorder.batches(),
        vec![vec![Change::insert(
            RowKey::new(vec!["1".into(), "1".into()]),
            row! { "id" => "1", "name" => "a" }
        )]]
    );
    recorder.clear();

    // renaming a person updates their row in place
    people.update("2", row! { "id" => "2", "name" => "bee" }).unwrap();
    assert_eq!(
        recorder.changes(),
        vec![Change::update(
            RowKey::new(vec!["2".into(), "2".into()]),
            row! { "id" => "2", "name" => "bee" }
        )]
    );
    recorder.clear();

    people.delete("1").unwrap();
    let changes = recorder.changes();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].kind, livedb::ChangeKind::Delete);
    assert_eq!(live.rows(), vec![row! { "id" => "2", "name" => "bee" }]);
}
