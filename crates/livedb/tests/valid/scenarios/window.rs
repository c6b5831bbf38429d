use super::super::Recorder;
use livedb::{fields, materialize, row, Change, ChangeKind, Direction, MemCollection, Plan};
use std::rc::Rc;

pub fn test() {
    let scores = MemCollection::keyed_by("Scores", "name");
    for (name, team, score) in [("a", "red", 10), ("b", "blue", 30), ("c", "red", 20)] {
        scores
            .insert_row(row! { "name" => name, "team" => team, "score" => score })
            .unwrap();
    }

    let mut plan = Plan::new();
    let s = plan.collection(scores.clone());
    let top = plan
        .query(|q| {
            let s = q.from(s);
            q.select(fields! { name: s.get("name"), score: s.get("score") })
                .order_by(s.get("score"), Direction::Desc)
                .limit(2);
        })
        .unwrap();
    let teams = plan
        .query(|q| {
            let s = q.from(s);
            q.select(fields! { team: s.get("team") }).distinct();
        })
        .unwrap();
    let plan = Rc::new(plan);

    let top = materialize(&plan, top).unwrap();
    let teams = materialize(&plan, teams).unwrap();
    let recorder = Recorder::default();
    let _sub = recorder.attach(&top);
    let _teams = teams.subscribe_changes(|_| ()).unwrap();
    assert_eq!(
        top.rows(),
        vec![row! { "name" => "b", "score" => 30 }, row! { "name" => "c", "score" => 20 }]
    );
    assert_eq!(teams.rows(), vec![row! { "team" => "blue" }, row! { "team" => "red" }]);
    recorder.clear();

    scores
        .insert_row(row! { "name" => "d", "team" => "green", "score" => 25 })
        .unwrap();
    assert_eq!(
        recorder.changes(),
        vec![
            Change::delete("c", row! { "name" => "c", "score" => 20 }),
            Change::insert("d", row! { "name" => "d", "score" => 25 }),
        ]
    );
    assert_eq!(
        top.rows(),
        vec![row! { "name" => "b", "score" => 30 }, row! { "name" => "d", "score" => 25 }]
    );
    assert_eq!(teams.rows().len(), 3);

    // a change outside the window produces nothing
    recorder.clear();
    scores.update("a", row! { "name" => "a", "team" => "red", "score" => 11 }).unwrap();
    assert!(recorder.batches().is_empty());

    scores.delete("c").unwrap();
    assert_eq!(teams.rows().len(), 3);
    scores.delete("a").unwrap();
    assert_eq!(teams.rows(), vec![row! { "team" => "blue" }, row! { "team" => "green" }]);
    assert!(recorder.changes().iter().all(|c| c.kind != ChangeKind::Update));
}
