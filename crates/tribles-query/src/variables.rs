//! Building queries from named variables instead of raw slot numbers.
//!
//! A [`VariableContext`] hands out [`Variable`] handles and records the
//! constraints that mention them. [`VariableContext::arrange`] then fixes
//! the slot order (which is the join's depth order) and yields a [`Plan`]
//! whose rows are addressed by the same handles.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constraint::{CollectionConstraint, ConstantConstraint, Constraint, IndexConstraint, TripleConstraint};
use crate::error::QueryError;
use crate::index::SortedIndex;
use crate::query::{query, Binding, Query, QueryOptions};
use crate::trible::{Id, Value};
use crate::tribleset::TribleSet;

/// How the bytes bound to a variable are meant to be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// A left-padded 16-byte id.
    Id,
    /// UTF-8 text, zero-padded on the right.
    ShortString,
    /// A 32-byte digest.
    Hash,
    Opaque,
}

impl ValueKind {
    /// Whether `value` is a well-formed instance of this kind.
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            ValueKind::Id => value.as_id().is_some(),
            ValueKind::ShortString => short_string(value).is_some(),
            ValueKind::Hash | ValueKind::Opaque => true,
        }
    }
}

/// The text of a zero-padded short string value.
pub fn short_string(value: &Value) -> Option<&str> {
    let raw = value.raw();
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    if raw[end..].iter().any(|&b| b != 0) {
        return None;
    }
    std::str::from_utf8(&raw[..end]).ok()
}

/// Encode `text` as a short string value; `None` when it does not fit or
/// contains a NUL.
pub fn short_string_value(text: &str) -> Option<Value> {
    let bytes = text.as_bytes();
    if bytes.len() > 32 || bytes.contains(&0) {
        return None;
    }
    let mut raw = [0u8; 32];
    raw[..bytes.len()].copy_from_slice(bytes);
    Some(Value::new(raw))
}

/// A handle to a query variable, valid for the context that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Variable(usize);

/// Either a variable or a fixed value in a pattern position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Term {
    Variable(Variable),
    Constant(Value),
}

impl From<Variable> for Term {
    fn from(v: Variable) -> Self {
        Term::Variable(v)
    }
}

impl From<Value> for Term {
    fn from(v: Value) -> Self {
        Term::Constant(v)
    }
}

impl From<Id> for Term {
    fn from(id: Id) -> Self {
        Term::Constant(Value::from_id(id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Origin {
    Named(String),
    Unnamed,
    Constant(Value),
}

#[derive(Debug, Clone)]
struct Info {
    origin: Origin,
    kind: Option<ValueKind>,
    pinned: Option<usize>,
    ascending: bool,
}

impl Info {
    fn label(&self, var: Variable) -> String {
        match &self.origin {
            Origin::Named(name) => name.clone(),
            Origin::Unnamed => format!("_{}", var.0),
            Origin::Constant(value) => format!("#{value}"),
        }
    }
}

type UnaryBuilder = Box<dyn FnOnce(usize) -> Result<Box<dyn Constraint>, QueryError>>;

enum Pending {
    Triple { set: TribleSet, terms: [Variable; 3] },
    Unary { variable: Variable, build: UnaryBuilder },
}

/// Collects variables and constraints for one query.
#[derive(Default)]
pub struct VariableContext {
    infos: Vec<Info>,
    names: BTreeMap<String, Variable>,
    constants: BTreeMap<Value, Variable>,
    pending: Vec<Pending>,
}

impl VariableContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    fn fresh(&mut self, origin: Origin) -> Variable {
        let var = Variable(self.infos.len());
        self.infos.push(Info {
            origin,
            kind: None,
            pinned: None,
            ascending: true,
        });
        var
    }

    /// The variable called `name`; asking twice returns the same handle.
    pub fn named(&mut self, name: &str) -> Variable {
        if let Some(&var) = self.names.get(name) {
            return var;
        }
        let var = self.fresh(Origin::Named(name.to_string()));
        self.names.insert(name.to_string(), var);
        var
    }

    pub fn unnamed(&mut self) -> Variable {
        self.fresh(Origin::Unnamed)
    }

    /// A variable bound to exactly `value`; one per distinct value.
    pub fn constant(&mut self, value: Value) -> Variable {
        if let Some(&var) = self.constants.get(&value) {
            return var;
        }
        let var = self.fresh(Origin::Constant(value));
        self.constants.insert(value, var);
        var
    }

    fn term(&mut self, term: Term) -> Variable {
        match term {
            Term::Variable(var) => var,
            Term::Constant(value) => self.constant(value),
        }
    }

    /// Force `var` into `slot`.
    pub fn pin(&mut self, var: Variable, slot: usize) -> Result<(), QueryError> {
        if self
            .infos
            .iter()
            .enumerate()
            .any(|(i, info)| i != var.0 && info.pinned == Some(slot))
        {
            return Err(QueryError::SlotOccupied { slot });
        }
        self.infos[var.0].pinned = Some(slot);
        Ok(())
    }

    pub fn ascend(&mut self, var: Variable) {
        self.infos[var.0].ascending = true;
    }

    pub fn descend(&mut self, var: Variable) {
        self.infos[var.0].ascending = false;
    }

    /// Declare how `var` is read. Constants carry their own bytes and are
    /// never checked.
    pub fn set_kind(&mut self, var: Variable, kind: ValueKind) -> Result<(), QueryError> {
        let info = &mut self.infos[var.0];
        if matches!(info.origin, Origin::Constant(_)) {
            return Ok(());
        }
        match info.kind {
            Some(existing) if existing != kind => Err(QueryError::IncompatibleKinds {
                variable: info.label(var),
                existing,
                requested: kind,
            }),
            _ => {
                info.kind = Some(kind);
                Ok(())
            }
        }
    }

    pub fn kind(&self, var: Variable) -> Option<ValueKind> {
        self.infos[var.0].kind
    }

    /// Match `(e, a, v)` against `set`. Entities and attributes are ids;
    /// the value is read as `kind`.
    pub fn pattern(
        &mut self,
        set: &TribleSet,
        e: impl Into<Term>,
        a: impl Into<Term>,
        v: impl Into<Term>,
        kind: ValueKind,
    ) -> Result<(), QueryError> {
        let e = self.term(e.into());
        let a = self.term(a.into());
        let v = self.term(v.into());
        self.set_kind(e, ValueKind::Id)?;
        self.set_kind(a, ValueKind::Id)?;
        self.set_kind(v, kind)?;
        self.pending.push(Pending::Triple {
            set: set.clone(),
            terms: [e, a, v],
        });
        Ok(())
    }

    /// Restrict `var` to `values`.
    pub fn in_collection(&mut self, var: Variable, values: impl IntoIterator<Item = Value>) {
        let values: Vec<Value> = values.into_iter().collect();
        self.pending.push(Pending::Unary {
            variable: var,
            build: Box::new(move |slot| {
                Ok(Box::new(CollectionConstraint::new(slot, values)) as Box<dyn Constraint>)
            }),
        });
    }

    /// Restrict `var` to the keys of a 32-byte value index.
    pub fn in_index<V: Send + Sync + 'static>(&mut self, var: Variable, index: SortedIndex<V>) {
        self.pending.push(Pending::Unary {
            variable: var,
            build: Box::new(move |slot| {
                Ok(Box::new(IndexConstraint::new(slot, &index)?) as Box<dyn Constraint>)
            }),
        });
    }

    /// Assign slots and instantiate the constraints.
    ///
    /// Pinned variables keep their slot; the rest fill the lowest free
    /// slots in this order: constants by value, unnamed variables, then
    /// named ones, each group in creation order.
    pub fn arrange(self) -> Result<Plan, QueryError> {
        let variable_count = self.infos.len();
        let mut slots: Vec<Option<usize>> = vec![None; variable_count];
        let mut taken = vec![false; variable_count];
        for (i, info) in self.infos.iter().enumerate() {
            if let Some(slot) = info.pinned {
                if slot >= variable_count {
                    return Err(QueryError::SlotOutOfRange {
                        slot,
                        variable_count,
                    });
                }
                slots[i] = Some(slot);
                taken[slot] = true;
            }
        }

        let unnamed = self
            .infos
            .iter()
            .enumerate()
            .filter(|(_, info)| info.origin == Origin::Unnamed)
            .map(|(i, _)| i);
        let named = self
            .infos
            .iter()
            .enumerate()
            .filter(|(_, info)| matches!(info.origin, Origin::Named(_)))
            .map(|(i, _)| i);
        let order: Vec<usize> = self
            .constants
            .values()
            .map(|v| v.0)
            .chain(unnamed)
            .chain(named)
            .collect();

        let mut free = (0..variable_count).filter(|&s| !taken[s]);
        for i in order {
            if slots[i].is_some() {
                continue;
            }
            slots[i] = free.next();
        }
        let slots: Vec<usize> = slots
            .into_iter()
            .enumerate()
            .map(|(i, slot)| slot.ok_or(QueryError::UnconstrainedSlot { slot: i }))
            .collect::<Result<_, _>>()?;

        let mut constraints: Vec<Box<dyn Constraint>> = Vec::new();
        for (&value, var) in &self.constants {
            constraints.push(Box::new(ConstantConstraint::new(slots[var.0], value)));
        }
        for pending in self.pending {
            match pending {
                Pending::Triple { set, terms } => {
                    let pattern = terms.map(|v| slots[v.0]);
                    constraints.push(Box::new(TripleConstraint::new(&set, pattern)));
                }
                Pending::Unary { variable, build } => {
                    constraints.push(build(slots[variable.0])?);
                }
            }
        }

        let mut ascending = vec![true; variable_count];
        for (i, info) in self.infos.iter().enumerate() {
            ascending[slots[i]] = info.ascending;
        }

        tracing::debug!(variable_count, constraints = constraints.len(), "arranged query");
        Ok(Plan {
            constraints,
            options: QueryOptions::new(variable_count).directions(ascending),
            slots,
            names: self.names,
        })
    }
}

/// A query with its slots fixed.
pub struct Plan {
    constraints: Vec<Box<dyn Constraint>>,
    options: QueryOptions,
    slots: Vec<usize>,
    names: BTreeMap<String, Variable>,
}

impl Plan {
    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    pub fn constraints(&self) -> &[Box<dyn Constraint>] {
        &self.constraints
    }

    pub fn slot(&self, var: Variable) -> usize {
        self.slots[var.0]
    }

    pub fn variable(&self, name: &str) -> Option<Variable> {
        self.names.get(name).copied()
    }

    pub fn query(&self) -> Result<Rows<'_>, QueryError> {
        Ok(Rows {
            plan: self,
            query: query(&self.constraints, &self.options)?,
        })
    }

    pub fn exists(&self) -> Result<bool, QueryError> {
        crate::query::exists(&self.constraints, self.options.variable_count)
    }
}

/// Rows of a [`Plan`], addressed by [`Variable`].
pub struct Rows<'p> {
    plan: &'p Plan,
    query: Query,
}

impl<'p> Iterator for Rows<'p> {
    type Item = Row<'p>;

    fn next(&mut self) -> Option<Row<'p>> {
        let binding = self.query.next()?;
        Some(Row {
            plan: self.plan,
            binding,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Row<'p> {
    plan: &'p Plan,
    binding: Binding,
}

impl std::fmt::Debug for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plan")
            .field("constraints", &self.constraints.len())
            .field("options", &self.options)
            .field("slots", &self.slots)
            .finish()
    }
}

impl Row<'_> {
    pub fn get(&self, var: Variable) -> Value {
        self.binding[self.plan.slot(var)]
    }

    pub fn id(&self, var: Variable) -> Option<Id> {
        self.get(var).as_id()
    }

    pub fn named(&self, name: &str) -> Option<Value> {
        self.plan.variable(name).map(|var| self.get(var))
    }

    pub fn binding(&self) -> &Binding {
        &self.binding
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trible::Trible;

    fn id(n: u128) -> Id {
        Id::from_u128(n)
    }

    fn people() -> TribleSet {
        let name = id(100);
        let age = id(101);
        TribleSet::from_tribles([
            Trible::new(id(1), name, short_string_value("ada").unwrap()),
            Trible::new(id(1), age, Value::from_u128(36)),
            Trible::new(id(2), name, short_string_value("grace").unwrap()),
            Trible::new(id(2), age, Value::from_u128(85)),
            Trible::new(id(3), name, short_string_value("alan").unwrap()),
        ])
    }

    #[test]
    fn named_and_constant_handles_are_cached() {
        let mut ctx = VariableContext::new();
        let a = ctx.named("a");
        assert_eq!(ctx.named("a"), a);
        assert_ne!(ctx.unnamed(), a);
        let c = ctx.constant(Value::from_u128(7));
        assert_eq!(ctx.constant(Value::from_u128(7)), c);
        assert_eq!(ctx.len(), 3);
    }

    #[test]
    fn pinning_twice_to_a_slot_fails() {
        let mut ctx = VariableContext::new();
        let a = ctx.named("a");
        let b = ctx.named("b");
        ctx.pin(a, 0).unwrap();
        ctx.pin(a, 1).unwrap();
        assert_eq!(ctx.pin(b, 1), Err(QueryError::SlotOccupied { slot: 1 }));
    }

    #[test]
    fn conflicting_kinds_are_rejected() {
        let set = people();
        let mut ctx = VariableContext::new();
        let e = ctx.named("e");
        let v = ctx.named("v");
        ctx.pattern(&set, e, id(100), v, ValueKind::ShortString).unwrap();
        let err = ctx.pattern(&set, v, id(101), e, ValueKind::Opaque).unwrap_err();
        assert!(matches!(
            err,
            QueryError::IncompatibleKinds {
                existing: ValueKind::ShortString,
                requested: ValueKind::Id,
                ..
            }
        ));
    }

    #[test]
    fn arrange_orders_constants_then_unnamed_then_named() {
        let set = people();
        let mut ctx = VariableContext::new();
        let person = ctx.named("person");
        let name = ctx.unnamed();
        ctx.pattern(&set, person, id(100), name, ValueKind::ShortString).unwrap();
        let plan = ctx.arrange().unwrap();
        let attribute = Variable(2);
        assert_eq!(plan.slot(attribute), 0);
        assert_eq!(plan.slot(name), 1);
        assert_eq!(plan.slot(person), 2);
        assert_eq!(plan.query().unwrap().count(), 3);
    }

    #[test]
    fn join_through_builder() {
        let set = people();
        let mut ctx = VariableContext::new();
        let person = ctx.named("person");
        let name = ctx.named("name");
        let age = ctx.named("age");
        ctx.pin(person, 0).unwrap();
        ctx.pattern(&set, person, id(100), name, ValueKind::ShortString).unwrap();
        ctx.pattern(&set, person, id(101), age, ValueKind::Opaque).unwrap();
        let plan = ctx.arrange().unwrap();

        let rows: Vec<(Id, String)> = plan
            .query()
            .unwrap()
            .map(|row| {
                let name = short_string(&row.get(name)).unwrap().to_string();
                (row.id(person).unwrap(), name)
            })
            .collect();
        assert_eq!(rows, vec![(id(1), "ada".to_string()), (id(2), "grace".to_string())]);
        assert!(plan.exists().unwrap());
    }

    #[test]
    fn descending_variable_reverses_rows() {
        let set = people();
        let mut ctx = VariableContext::new();
        let person = ctx.named("person");
        let name = ctx.named("name");
        ctx.descend(person);
        ctx.pattern(&set, person, id(100), name, ValueKind::ShortString).unwrap();
        let plan = ctx.arrange().unwrap();
        let ids: Vec<Id> = plan.query().unwrap().filter_map(|r| r.id(person)).collect();
        assert_eq!(ids, vec![id(3), id(2), id(1)]);
    }

    #[test]
    fn collection_restricts_a_variable() {
        let set = people();
        let mut ctx = VariableContext::new();
        let person = ctx.named("person");
        let name = ctx.named("name");
        ctx.pattern(&set, person, id(100), name, ValueKind::ShortString).unwrap();
        ctx.in_collection(person, [Value::from_id(id(3)), Value::from_id(id(9))]);
        let plan = ctx.arrange().unwrap();
        let names: Vec<Option<Value>> = plan.query().unwrap().map(|r| r.named("name")).collect();
        assert_eq!(names, vec![short_string_value("alan")]);
    }

    #[test]
    fn short_strings() {
        let v = short_string_value("hello").unwrap();
        assert_eq!(short_string(&v), Some("hello"));
        assert!(ValueKind::ShortString.accepts(&v));
        assert!(!ValueKind::Id.accepts(&v));
        assert!(short_string_value(&"x".repeat(33)).is_none());
        let mut raw = [0u8; 32];
        raw[0] = b'a';
        raw[5] = b'b';
        assert_eq!(short_string(&Value::new(raw)), None);
    }
}
