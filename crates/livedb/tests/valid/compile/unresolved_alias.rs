use livedb::{fields, BuildError, MemCollection, Plan};

pub fn test() {
    let people = MemCollection::new("Person");
    let ages = MemCollection::new("PersonAge");
    let mut plan = Plan::new();
    let p = plan.collection(people.clone());
    let a = plan.collection(ages.clone());

    // a proxy for an alias bound by another query
    let mut stray = None;
    let _other = plan
        .query(|q| {
            let s = q.from(p);
            stray = Some(s.clone());
            q.select_value(s);
        })
        .unwrap();
    let stray = stray.unwrap();

    let res = plan.query(|q| {
        let a = q.from(a);
        q.select(fields! { age: a.get("age"), name: stray.get("name") });
    });
    match res {
        Err(BuildError::UnresolvedAlias { path }) => assert_eq!(path, format!("{}.name", stray.alias())),
        other => panic!("expected an unresolved alias, got {other:?}"),
    }

    // rejected before anything could subscribe
    assert_eq!(people.subscriber_count(), 0);
    assert_eq!(ages.subscriber_count(), 0);
}
