use super::{Operand, RefProxy, SelectItem};
use crate::{
    errors::BuildError,
    graph::DependencyGraph,
    plan::{
        AggFunc, CollectionRef, Direction, ExprRef, Expression, JoinKind, Key, OrderTerm, Plan,
        Query, QueryBody, ScalarFunc, SelectField, Selection, Source, SourceKind,
    },
};
use livedb_store::Scalar;

/// What a `from` or `join` reads: a base collection or another query.
#[derive(Clone, Copy, Debug)]
pub enum SourceArg {
    Collection(Key<CollectionRef>),
    Query(Query),
}

impl From<Key<CollectionRef>> for SourceArg {
    fn from(c: Key<CollectionRef>) -> Self {
        SourceArg::Collection(c)
    }
}
impl From<Query> for SourceArg {
    fn from(q: Query) -> Self {
        SourceArg::Query(q)
    }
}

impl Plan {
    /// Build a query. The closure describes the query through the
    /// [`QueryScope`], and must call [`QueryScope::select`] (or
    /// [`QueryScope::select_value`]).
    /// - The query is validated and compiled (to check alias resolution and
    ///   acyclicity) before it is returned.
    pub fn query(&mut self, build: impl FnOnce(&mut QueryScope<'_>)) -> Result<Query, BuildError> {
        let body = self.bodies.insert(QueryBody::default());
        let mut scope = QueryScope::new(self, body);
        build(&mut scope);
        scope.finish()?;
        let query = Query { body };
        let graph = DependencyGraph::build(self, query)?;
        log::debug!(
            "built query #{} with {} dependency nodes",
            body.arr_idx(),
            graph.len()
        );
        Ok(query)
    }
}

/// The builder for one query body. Errors are deferred: the first is kept and
/// returned when the query is finished.
pub struct QueryScope<'p> {
    plan: &'p mut Plan,
    body: Key<QueryBody>,
    error: Option<BuildError>,
}

impl<'p> QueryScope<'p> {
    fn new(plan: &'p mut Plan, body: Key<QueryBody>) -> Self {
        Self {
            plan,
            body,
            error: None,
        }
    }

    fn finish(self) -> Result<(), BuildError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        if self.plan.get_body(self.body).selection.is_none() {
            return Err(BuildError::MissingSelection);
        }
        Ok(())
    }

    fn fail(&mut self, err: BuildError) {
        log::trace!("query #{} build error: {err}", self.body.arr_idx());
        self.error.get_or_insert(err);
    }

    fn body_mut(&mut self) -> &mut QueryBody {
        self.plan.get_mut_body(self.body)
    }

    pub fn query(&self) -> Query {
        Query { body: self.body }
    }

    pub fn plan(&self) -> &Plan {
        self.plan
    }

    // ---------------------------------------------------------------------
    // sources

    /// Set the first source under a generated alias.
    pub fn from(&mut self, source: impl Into<SourceArg>) -> RefProxy {
        let alias = self.plan.fresh_alias();
        self.bind(alias, source.into(), None)
    }

    pub fn from_as(&mut self, alias: &str, source: impl Into<SourceArg>) -> RefProxy {
        self.bind(alias.to_owned(), source.into(), None)
    }

    /// Inner join, with the condition built from the proxy of the joined
    /// source.
    pub fn join<O: Into<Operand>>(
        &mut self,
        source: impl Into<SourceArg>,
        on: impl FnOnce(&mut Self, &RefProxy) -> O,
    ) -> RefProxy {
        self.join_with(source, JoinKind::Inner, on)
    }

    pub fn join_with<O: Into<Operand>>(
        &mut self,
        source: impl Into<SourceArg>,
        kind: JoinKind,
        on: impl FnOnce(&mut Self, &RefProxy) -> O,
    ) -> RefProxy {
        let alias = self.plan.fresh_alias();
        self.join_as(&alias, source, kind, on)
    }

    pub fn join_as<O: Into<Operand>>(
        &mut self,
        alias: &str,
        source: impl Into<SourceArg>,
        kind: JoinKind,
        on: impl FnOnce(&mut Self, &RefProxy) -> O,
    ) -> RefProxy {
        let proxy = self.bind(alias.to_owned(), source.into(), Some(kind));
        let cond = on(self, &proxy);
        self.on(&proxy, cond);
        proxy
    }

    /// Join, matching fields of the joined source to operands:
    /// `join_fields(ages, [("person", p.get("id"))])` joins where
    /// `ages.person == p.id`.
    pub fn join_fields<N: AsRef<str>, O: Into<Operand>>(
        &mut self,
        source: impl Into<SourceArg>,
        kind: JoinKind,
        fields: impl IntoIterator<Item = (N, O)>,
    ) -> RefProxy {
        let alias = self.plan.fresh_alias();
        let proxy = self.bind(alias, source.into(), Some(kind));
        for (field, value) in fields {
            let cond = self.eq(proxy.get(field.as_ref()), value);
            self.on(&proxy, cond);
        }
        proxy
    }

    /// Add a join condition for a joined alias, merged with any existing
    /// condition by conjunction.
    pub fn on(&mut self, alias: &RefProxy, cond: impl Into<Operand>) {
        let cond = self.operand(cond);
        let alias = alias.alias().to_owned();
        let Some(source) = self.plan.source_by_alias(self.body, &alias) else {
            return self.fail(BuildError::UnknownAlias(alias));
        };
        if self.plan.get_source(source).join.is_none() {
            // the first source has nothing to join against, so the condition filters it
            return self.filter(cond);
        }
        let existing = self.plan.get_body(self.body).join_condition(&alias);
        let merged = match existing {
            Some(existing) => self.call(ScalarFunc::And, [existing, cond]),
            None => cond,
        };
        let conds = &mut self.body_mut().join_conditions;
        match conds.iter_mut().find(|(a, _)| *a == alias) {
            Some(entry) => entry.1 = merged,
            None => conds.push((alias, merged)),
        }
    }

    fn bind(&mut self, alias: String, source: SourceArg, join: Option<JoinKind>) -> RefProxy {
        let has_from = !self.plan.get_body(self.body).sources.is_empty();
        match (join, has_from) {
            (None, true) => self.fail(BuildError::FromRedefined),
            (Some(_), false) => self.fail(BuildError::JoinWithoutFrom),
            _ => (),
        }
        if self.plan.source_by_alias(self.body, &alias).is_some() {
            self.fail(BuildError::DuplicateAlias(alias.clone()));
        }
        let kind = match source {
            SourceArg::Collection(c) => SourceKind::Collection(c),
            SourceArg::Query(q) => SourceKind::Query(q.body),
        };
        let key = self.plan.sources.insert(Source {
            alias: alias.clone(),
            kind,
            join,
        });
        self.body_mut().sources.push(key);
        RefProxy::root(self.body, alias)
    }

    /// The `where` clause, multiple calls are merged by conjunction.
    pub fn filter(&mut self, cond: impl Into<Operand>) {
        let cond = self.operand(cond);
        let existing = self.plan.get_body(self.body).filter;
        let merged = match existing {
            Some(existing) => self.call(ScalarFunc::And, [existing, cond]),
            None => cond,
        };
        self.body_mut().filter = Some(merged);
    }

    /// A nested query, for use as a source or as a scalar value. It may refer
    /// to the aliases of this query.
    pub fn subquery(&mut self, build: impl FnOnce(&mut QueryScope<'_>)) -> Query {
        let body = self.plan.bodies.insert(QueryBody::default());
        let mut sub = QueryScope::new(&mut *self.plan, body);
        build(&mut sub);
        if let Err(err) = sub.finish() {
            self.fail(err);
        }
        Query { body }
    }

    // ---------------------------------------------------------------------
    // selection

    pub fn select<I: Into<SelectItem>>(
        &mut self,
        items: impl IntoIterator<Item = I>,
    ) -> SelectOptions<'_, 'p> {
        let fields = items
            .into_iter()
            .map(|item| match item.into() {
                SelectItem::Field(name, value) => SelectField::Named {
                    name,
                    expr: self.operand(value),
                },
                SelectItem::Spread(value) => SelectField::Spread(self.operand(value)),
            })
            .collect();
        self.set_selection(Selection::Fields(fields))
    }

    /// Select a single value. A whole source row (or other record) becomes
    /// the output row, otherwise the output has one field, `value`.
    pub fn select_value(&mut self, value: impl Into<Operand>) -> SelectOptions<'_, 'p> {
        let value = value.into();
        if let Operand::Ref(proxy) = &value {
            if proxy.is_root() {
                self.mark_spread(proxy);
            }
        }
        let expr = self.operand(value);
        self.set_selection(Selection::Value(expr))
    }

    /// Select every field of a whole source row (or a record valued field).
    pub fn spread(&mut self, proxy: &RefProxy) -> SelectItem {
        if proxy.is_root() {
            self.mark_spread(proxy);
        }
        SelectItem::Spread(Operand::Ref(proxy.clone()))
    }

    fn mark_spread(&mut self, proxy: &RefProxy) {
        let alias = proxy.alias().to_owned();
        let spread = &mut self.body_mut().spread_aliases;
        if !spread.contains(&alias) {
            spread.push(alias);
        }
    }

    fn set_selection(&mut self, selection: Selection) -> SelectOptions<'_, 'p> {
        if self.plan.get_body(self.body).selection.is_some() {
            self.fail(BuildError::SelectionRedefined);
        } else {
            self.body_mut().selection = Some(selection);
        }
        SelectOptions { scope: self }
    }

    // ---------------------------------------------------------------------
    // expressions

    /// Convert an operand into an expression of the plan.
    pub fn operand(&mut self, value: impl Into<Operand>) -> ExprRef {
        match value.into() {
            Operand::Expr(e) => e,
            Operand::Ref(proxy) => self.plan.reference(proxy.body, &proxy.path),
            Operand::Value(v) => self.plan.exprs.insert(Expression::Literal(v)),
            Operand::Query(q) => self.plan.subquery_expr(q.body),
        }
    }

    pub fn lit(&mut self, value: impl Into<Scalar>) -> ExprRef {
        self.plan.exprs.insert(Expression::Literal(value.into()))
    }

    pub fn call<O: Into<Operand>>(
        &mut self,
        func: ScalarFunc,
        args: impl IntoIterator<Item = O>,
    ) -> ExprRef {
        let args = args.into_iter().map(|a| self.operand(a)).collect();
        self.plan.exprs.insert(Expression::Call { func, args })
    }

    /// Call a function by name, e.g. `"eq"` or `"upper"`.
    pub fn call_named<O: Into<Operand>>(
        &mut self,
        name: &str,
        args: impl IntoIterator<Item = O>,
    ) -> ExprRef {
        match ScalarFunc::from_name(name) {
            Some(func) => self.call(func, args),
            None => {
                self.fail(BuildError::UnknownFunction(name.to_owned()));
                self.lit(Scalar::Null)
            }
        }
    }

    pub fn aggregate<O: Into<Operand>>(
        &mut self,
        func: AggFunc,
        args: impl IntoIterator<Item = O>,
    ) -> ExprRef {
        let args = args.into_iter().map(|a| self.operand(a)).collect();
        self.plan.exprs.insert(Expression::Aggregate { func, args })
    }

    fn binary(&mut self, func: ScalarFunc, a: impl Into<Operand>, b: impl Into<Operand>) -> ExprRef {
        let args = vec![self.operand(a), self.operand(b)];
        self.plan.exprs.insert(Expression::Call { func, args })
    }

    fn unary(&mut self, func: ScalarFunc, a: impl Into<Operand>) -> ExprRef {
        self.call(func, [a.into()])
    }

    pub fn eq(&mut self, a: impl Into<Operand>, b: impl Into<Operand>) -> ExprRef {
        self.binary(ScalarFunc::Eq, a, b)
    }
    pub fn neq(&mut self, a: impl Into<Operand>, b: impl Into<Operand>) -> ExprRef {
        self.binary(ScalarFunc::Neq, a, b)
    }
    pub fn lt(&mut self, a: impl Into<Operand>, b: impl Into<Operand>) -> ExprRef {
        self.binary(ScalarFunc::Lt, a, b)
    }
    pub fn lte(&mut self, a: impl Into<Operand>, b: impl Into<Operand>) -> ExprRef {
        self.binary(ScalarFunc::Lte, a, b)
    }
    pub fn gt(&mut self, a: impl Into<Operand>, b: impl Into<Operand>) -> ExprRef {
        self.binary(ScalarFunc::Gt, a, b)
    }
    pub fn gte(&mut self, a: impl Into<Operand>, b: impl Into<Operand>) -> ExprRef {
        self.binary(ScalarFunc::Gte, a, b)
    }
    pub fn add(&mut self, a: impl Into<Operand>, b: impl Into<Operand>) -> ExprRef {
        self.binary(ScalarFunc::Add, a, b)
    }
    pub fn sub(&mut self, a: impl Into<Operand>, b: impl Into<Operand>) -> ExprRef {
        self.binary(ScalarFunc::Sub, a, b)
    }
    pub fn mul(&mut self, a: impl Into<Operand>, b: impl Into<Operand>) -> ExprRef {
        self.binary(ScalarFunc::Mul, a, b)
    }
    pub fn div(&mut self, a: impl Into<Operand>, b: impl Into<Operand>) -> ExprRef {
        self.binary(ScalarFunc::Div, a, b)
    }

    pub fn and<O: Into<Operand>>(&mut self, args: impl IntoIterator<Item = O>) -> ExprRef {
        self.call(ScalarFunc::And, args)
    }
    pub fn or<O: Into<Operand>>(&mut self, args: impl IntoIterator<Item = O>) -> ExprRef {
        self.call(ScalarFunc::Or, args)
    }
    pub fn concat<O: Into<Operand>>(&mut self, args: impl IntoIterator<Item = O>) -> ExprRef {
        self.call(ScalarFunc::Concat, args)
    }
    pub fn coalesce<O: Into<Operand>>(&mut self, args: impl IntoIterator<Item = O>) -> ExprRef {
        self.call(ScalarFunc::Coalesce, args)
    }

    pub fn not(&mut self, a: impl Into<Operand>) -> ExprRef {
        self.unary(ScalarFunc::Not, a)
    }
    pub fn length(&mut self, a: impl Into<Operand>) -> ExprRef {
        self.unary(ScalarFunc::Length, a)
    }
    pub fn upper(&mut self, a: impl Into<Operand>) -> ExprRef {
        self.unary(ScalarFunc::Upper, a)
    }
    pub fn lower(&mut self, a: impl Into<Operand>) -> ExprRef {
        self.unary(ScalarFunc::Lower, a)
    }
    pub fn is_null(&mut self, a: impl Into<Operand>) -> ExprRef {
        self.unary(ScalarFunc::IsNull, a)
    }

    /// Number of rows in the group.
    pub fn count_all(&mut self) -> ExprRef {
        self.aggregate(AggFunc::Count, Vec::<Operand>::new())
    }
    /// Number of rows in the group where the value is not null (or, for a
    /// whole source row, where the source is bound).
    pub fn count(&mut self, a: impl Into<Operand>) -> ExprRef {
        self.aggregate(AggFunc::Count, [a.into()])
    }
    pub fn sum(&mut self, a: impl Into<Operand>) -> ExprRef {
        self.aggregate(AggFunc::Sum, [a.into()])
    }
    pub fn min(&mut self, a: impl Into<Operand>) -> ExprRef {
        self.aggregate(AggFunc::Min, [a.into()])
    }
    pub fn max(&mut self, a: impl Into<Operand>) -> ExprRef {
        self.aggregate(AggFunc::Max, [a.into()])
    }
    pub fn avg(&mut self, a: impl Into<Operand>) -> ExprRef {
        self.aggregate(AggFunc::Avg, [a.into()])
    }
}

/// Result options of a query, available once the projection is set.
pub struct SelectOptions<'s, 'p> {
    scope: &'s mut QueryScope<'p>,
}

impl SelectOptions<'_, '_> {
    /// Condition on groups, may use aggregates. Requires
    /// [`SelectOptions::group_by`].
    pub fn having(self, cond: impl Into<Operand>) -> Self {
        let cond = self.scope.operand(cond);
        let existing = self.scope.plan.get_body(self.scope.body).having;
        let merged = match existing {
            Some(existing) => self.scope.call(ScalarFunc::And, [existing, cond]),
            None => cond,
        };
        self.scope.body_mut().having = Some(merged);
        self
    }

    pub fn group_by<O: Into<Operand>>(self, keys: impl IntoIterator<Item = O>) -> Self {
        let keys: Vec<ExprRef> = keys.into_iter().map(|k| self.scope.operand(k)).collect();
        self.scope
            .body_mut()
            .group_by
            .get_or_insert_with(Vec::new)
            .extend(keys);
        self
    }

    /// Sort the output, later calls add lower priority sort terms.
    pub fn order_by(self, expr: impl Into<Operand>, direction: Direction) -> Self {
        let expr = self.scope.operand(expr);
        self.scope
            .body_mut()
            .order_by
            .get_or_insert_with(Vec::new)
            .push(OrderTerm { expr, direction });
        self
    }

    pub fn limit(self, n: usize) -> Self {
        self.scope.body_mut().limit = Some(n);
        self
    }

    pub fn offset(self, n: usize) -> Self {
        self.scope.body_mut().offset = Some(n);
        self
    }

    pub fn distinct(self) -> Self {
        self.scope.body_mut().distinct = true;
        self
    }
}
