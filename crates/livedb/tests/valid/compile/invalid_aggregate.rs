use livedb::{fields, livedb_core::errors::Clause, BuildError, MemCollection, Plan};

pub fn test() {
    let mut plan = Plan::new();
    let messages = plan.collection(MemCollection::new("Messages"));

    let in_where = plan.query(|q| {
        let m = q.from(messages);
        let n = q.count_all();
        let busy = q.gt(n, 10);
        q.filter(busy);
        q.select(fields! { id: m.get("id") });
    });
    assert!(matches!(
        in_where,
        Err(BuildError::InvalidAggregatePlacement {
            clause: Clause::Where,
            ..
        })
    ));

    let in_group_by = plan.query(|q| {
        let m = q.from(messages);
        let n = q.count_all();
        q.select(fields! { id: m.get("id") }).group_by([n]);
    });
    assert!(matches!(
        in_group_by,
        Err(BuildError::InvalidAggregatePlacement {
            clause: Clause::GroupBy,
            ..
        })
    ));

    let no_select = plan.query(|q| {
        q.from(messages);
    });
    assert_eq!(no_select, Err(BuildError::MissingSelection));
}
