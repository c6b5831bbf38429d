use livedb::{
    fields, materialize, materialize_with, row, EvalError, FieldPolicy, LiveError, LiveOptions,
    MemCollection, Plan, Status,
};
use std::{cell::RefCell, rc::Rc};

pub fn test() {
    let people = MemCollection::keyed_by("Person", "id");
    people.insert_row(row! { "id" => "1", "name" => "a", "email" => "a@x" }).unwrap();

    let mut plan = Plan::new();
    let p = plan.collection(people.clone());
    let query = plan
        .query(|q| {
            let p = q.from(p);
            q.select(fields! { name: p.get("name"), email: p.get("email") });
        })
        .unwrap();
    let plan = Rc::new(plan);

    let lenient = materialize(&plan, query).unwrap();
    let strict = materialize_with(
        &plan,
        query,
        LiveOptions {
            id: Some("strict".to_owned()),
            field_policy: FieldPolicy::Strict,
            ..LiveOptions::default()
        },
    )
    .unwrap();

    let errors = Rc::new(RefCell::new(Vec::new()));
    {
        let errors = errors.clone();
        strict.on_error(move |err| errors.borrow_mut().push(err.clone()));
    }
    let _lenient_sub = lenient.subscribe_changes(|_| ()).unwrap();
    let _strict_sub = strict.subscribe_changes(|_| ()).unwrap();
    assert_eq!(strict.status(), Status::Ready);

    people.insert_row(row! { "id" => "2", "name" => "b" }).unwrap();

    // a missing field is dropped from the output row
    assert_eq!(
        lenient.rows(),
        vec![row! { "name" => "a", "email" => "a@x" }, row! { "name" => "b" }]
    );

    assert_eq!(strict.status(), Status::Errored);
    assert_eq!(errors.borrow().len(), 1);
    assert!(matches!(
        strict.error(),
        Some(LiveError::Eval { ref id, source: EvalError::FieldNotFound { ref path, .. } })
            if id == "strict" && path.ends_with(".email")
    ));
    assert!(matches!(strict.subscribe_changes(|_| ()), Err(LiveError::Eval { .. })));

    // further batches are dropped
    people.delete("1").unwrap();
    assert_eq!(errors.borrow().len(), 1);
    assert_eq!(lenient.rows().len(), 1);
}
