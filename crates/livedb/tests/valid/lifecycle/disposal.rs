use livedb::{fields, materialize, row, LiveError, MemCollection, Plan, Status};
use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

pub fn test() {
    let tasks = MemCollection::keyed_by("Tasks", "id");
    tasks.insert_row(row! { "id" => 1, "title" => "write" }).unwrap();

    let mut plan = Plan::new();
    let t = plan.collection(tasks.clone());
    let query = plan
        .query(|q| {
            let t = q.from(t);
            q.select(fields! { title: t.get("title") });
        })
        .unwrap();
    let plan = Rc::new(plan);

    // subscribes to its collection on materialization, and only then
    assert_eq!(tasks.subscriber_count(), 0);
    let live = materialize(&plan, query).unwrap();
    assert_eq!(tasks.subscriber_count(), 1);

    let seen = Rc::new(Cell::new(0));
    let counter = seen.clone();
    let _sub = live.subscribe_changes(move |_| counter.set(counter.get() + 1)).unwrap();
    assert_eq!(seen.get(), 1);

    live.dispose();
    live.dispose();
    assert_eq!(live.status(), Status::Disposed);
    assert_eq!(tasks.subscriber_count(), 0);

    tasks.insert_row(row! { "id" => 2, "title" => "review" }).unwrap();
    assert_eq!(seen.get(), 1);
    assert!(matches!(
        live.subscribe_changes(|_| ()),
        Err(LiveError::Disposed(id)) if id == live.id()
    ));
    assert!(matches!(live.preload(), Err(LiveError::Disposed(_))));

    // a subscriber that writes, then disposes, never sees its own write
    let live = materialize(&plan, query).unwrap();
    let batches = Rc::new(RefCell::new(Vec::new()));
    let armed = Rc::new(Cell::new(false));
    let _sub = {
        let batches = batches.clone();
        let armed = armed.clone();
        let handle = live.clone();
        let tasks = tasks.clone();
        live.subscribe_changes(move |changes| {
            batches.borrow_mut().push(changes.to_vec());
            if armed.replace(false) {
                tasks.insert_row(row! { "id" => 4, "title" => "queued" }).unwrap();
                handle.dispose();
            }
        })
        .unwrap()
    };
    assert_eq!(batches.borrow().len(), 1);
    armed.set(true);
    tasks.insert_row(row! { "id" => 3, "title" => "ship" }).unwrap();
    assert_eq!(batches.borrow().len(), 2);
    assert_eq!(live.status(), Status::Disposed);
    assert_eq!(tasks.subscriber_count(), 0);
    assert_eq!(tasks.len(), 4);
}
