use super::super::Recorder;
use livedb::{fields, materialize, row, Change, Direction, MemCollection, Plan};
use std::rc::Rc;

pub fn test() {
    let people = MemCollection::keyed_by("Person", "id");
    let ages = MemCollection::new("PersonAge");
    people.insert_row(row! { "id" => "1", "name" => "a" }).unwrap();
    people.insert_row(row! { "id" => "2", "name" => "b" }).unwrap();
    ages.insert("x", row! { "person" => "1", "age" => 30 }).unwrap();
    ages.insert("y", row! { "person" => "1", "age" => 31 }).unwrap();

    let mut plan = Plan::new();
    let person = plan.collection(people.clone());
    let person_age = plan.collection(ages.clone());
    let query = plan
        .query(|q| {
            let p = q.from(person);
            let recorded = q.subquery(|s| {
                let a = s.from(person_age);
                let mine = s.eq(a.get("person"), p.get("id"));
                s.filter(mine);
                let n = s.count_all();
                s.select(fields! { n: n });
            });
            q.select(fields! { name: p.get("name"), ages: recorded })
                .order_by(p.get("name"), Direction::Asc);
        })
        .unwrap();

    let live = materialize(&Rc::new(plan), query).unwrap();
    let recorder = Recorder::default();
    let _sub = recorder.attach(&live);
    assert_eq!(
        live.rows(),
        vec![row! { "name" => "a", "ages" => 2 }, row! { "name" => "b", "ages" => 0 }]
    );
    recorder.clear();

    ages.insert("z", row! { "person" => "2", "age" => 60 }).unwrap();
    assert_eq!(
        recorder.changes(),
        vec![Change::update("2", row! { "name" => "b", "ages" => 1 })]
    );
}
