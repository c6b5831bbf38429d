use livedb::{fields, materialize, row, DependencyGraph, MemCollection, Plan};
use std::rc::Rc;

pub fn test() {
    let people = MemCollection::keyed_by("Person", "id");
    people.insert_row(row! { "id" => "1", "name" => "a" }).unwrap();

    let mut plan = Plan::new();
    let p = plan.collection(people.clone());
    let mut shared = None;
    let query = plan
        .query(|q| {
            let p = q.from(p);
            let upper = q.upper(p.get("name"));
            shared = Some(upper);
            q.select(fields! { first: upper, second: upper });
        })
        .unwrap();

    let graph = DependencyGraph::build(&plan, query).unwrap();
    let node = graph.node_for_expr(shared.unwrap()).unwrap();
    assert_eq!(graph.get(node).depended_upon.len(), 2);
    assert_eq!(graph.outputs(), vec![graph.root()]);

    let live = materialize(&Rc::new(plan), query).unwrap();
    live.preload().unwrap();
    assert_eq!(live.rows(), vec![row! { "first" => "A", "second" => "A" }]);
}
