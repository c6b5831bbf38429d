use super::super::Recorder;
use livedb::{fields, materialize, row, ChangeKind, MemCollection, Plan};
use std::rc::Rc;

pub fn test() {
    let values = MemCollection::new("Values");
    for a in 1..=3 {
        values.insert(a, row! { "a" => a }).unwrap();
    }

    let mut plan = Plan::new();
    let v = plan.collection(values.clone());
    let query = plan
        .query(|q| {
            let v = q.from(v);
            let n = q.count_all();
            let total = q.sum(v.get("a"));
            let low = q.min(v.get("a"));
            q.select(fields! { n: n, total: total, low: low });
        })
        .unwrap();

    let live = materialize(&Rc::new(plan), query).unwrap();
    let recorder = Recorder::default();
    let _sub = recorder.attach(&live);
    assert_eq!(live.rows(), vec![row! { "n" => 3, "total" => 6, "low" => 1 }]);
    recorder.clear();

    values.delete(2).unwrap();
    assert_eq!(live.rows(), vec![row! { "n" => 2, "total" => 4, "low" => 1 }]);
    let changes = recorder.changes();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].kind, ChangeKind::Update);

    values.delete(1).unwrap();
    values.delete(3).unwrap();
    // the global group remains, with empty aggregates
    assert_eq!(live.rows(), vec![row! { "n" => 0, "total" => livedb::Scalar::Null, "low" => livedb::Scalar::Null }]);
}
