use livedb::{
    fields, materialize_with, row, BuildError, FieldPolicy, LiveOptions, MemCollection, Plan,
};
use std::rc::Rc;

pub fn test() {
    let [a, b, c] = ["A", "B", "C"].map(|name| {
        let collection = MemCollection::keyed_by(name, "id");
        collection.insert_row(row! { "id" => 1 }).unwrap();
        collection
    });
    let mut plan = Plan::new();
    let (ka, kb, kc) = (
        plan.collection(a.clone()),
        plan.collection(b.clone()),
        plan.collection(c.clone()),
    );

    // b's condition reads c, which is only bound once b has been joined
    let mut aliases = None;
    let res = plan.query(|q| {
        let pa = q.from(ka);
        let pb = q.join(kb, |q, pb| q.eq(pb.get("id"), pa.get("id")));
        let pc = q.join(kc, |q, pc| q.eq(pc.get("id"), pb.get("id")));
        let ahead = q.eq(pb.get("id"), pc.get("id"));
        q.on(&pb, ahead);
        aliases = Some((pb.alias().to_owned(), pc.alias().to_owned()));
        q.select(fields! { a: pa.get("id"), b: pb.get("id"), c: pc.get("id") });
    });
    let (b_alias, c_alias) = aliases.unwrap();
    assert_eq!(
        res,
        Err(BuildError::JoinReferencesLaterAlias {
            alias: b_alias,
            later: c_alias
        })
    );
    assert_eq!(b.subscriber_count(), 0);

    // the same condition placed on c reads only sources bound before it
    let query = plan
        .query(|q| {
            let pa = q.from(ka);
            let pb = q.join(kb, |q, pb| q.eq(pb.get("id"), pa.get("id")));
            let pc = q.join(kc, |q, pc| q.eq(pc.get("id"), pa.get("id")));
            let behind = q.eq(pb.get("id"), pc.get("id"));
            q.on(&pc, behind);
            q.select(fields! { a: pa.get("id"), b: pb.get("id"), c: pc.get("id") });
        })
        .unwrap();
    let live = materialize_with(
        &Rc::new(plan),
        query,
        LiveOptions {
            field_policy: FieldPolicy::Strict,
            start_preloaded: true,
            ..LiveOptions::default()
        },
    )
    .unwrap();
    assert_eq!(live.rows(), vec![row! { "a" => 1, "b" => 1, "c" => 1 }]);
}
