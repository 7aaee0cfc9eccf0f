//! JSON documents read by the CLI: fact files and query descriptions.
//!
//! Ids and values are written as hex strings. Shorter strings are
//! left-padded with zeros, so `"0a01"` is a valid id and, in a value
//! position, the same id stored left-padded. A value may instead be given
//! as `"s:text"` for a zero-padded short string.

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use tribles_query::{
    short_string_value, CollectionConstraint, ConstantConstraint, Constraint, Id, QueryOptions, Term,
    Trible, TribleSet, TripleConstraint, Value, Variable, VariableContext, ValueKind, ID_SIZE, VALUE_SIZE,
};

// ============================================================================
// Hex
// ============================================================================

fn parse_hex<const N: usize>(text: &str) -> Result<[u8; N]> {
    let digits = text.strip_prefix("0x").unwrap_or(text);
    if digits.len() > 2 * N {
        bail!("`{text}` is longer than {N} bytes");
    }
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        bail!("`{text}` is not hex");
    }
    let padded = format!("{digits:0>width$}", width = 2 * N);
    let mut out = [0u8; N];
    for (i, byte) in out.iter_mut().enumerate() {
        let pair = &padded[2 * i..2 * i + 2];
        *byte = u8::from_str_radix(pair, 16)?;
    }
    Ok(out)
}

pub fn parse_id(text: &str) -> Result<Id> {
    Ok(Id::new(parse_hex::<ID_SIZE>(text)?))
}

pub fn parse_value(text: &str) -> Result<Value> {
    if let Some(s) = text.strip_prefix("s:") {
        return short_string_value(s).ok_or_else(|| anyhow!("`{s}` does not fit in a short string"));
    }
    Ok(Value::new(parse_hex::<VALUE_SIZE>(text)?))
}

// ============================================================================
// Facts
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactDoc {
    pub e: String,
    pub a: String,
    pub v: String,
}

impl FactDoc {
    pub fn to_trible(&self) -> Result<Trible> {
        Ok(Trible::new(parse_id(&self.e)?, parse_id(&self.a)?, parse_value(&self.v)?))
    }
}

pub fn parse_facts(json: &str) -> Result<TribleSet> {
    let docs: Vec<FactDoc> = serde_json::from_str(json).context("parsing facts")?;
    let tribles = docs
        .iter()
        .enumerate()
        .map(|(i, doc)| doc.to_trible().with_context(|| format!("fact #{i}")))
        .collect::<Result<Vec<_>>>()?;
    Ok(TribleSet::from_tribles(tribles))
}

pub fn load_facts(path: &Path) -> Result<TribleSet> {
    let json = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    parse_facts(&json)
}

// ============================================================================
// Slot-level queries
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConstraintDoc {
    Constant { slot: usize, value: String },
    Collection { slot: usize, values: Vec<String> },
    Triple { pattern: [usize; 3] },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryDoc {
    pub options: QueryOptions,
    pub constraints: Vec<ConstraintDoc>,
}

impl QueryDoc {
    pub fn constraints(&self, set: &TribleSet) -> Result<Vec<Box<dyn Constraint>>> {
        self.constraints
            .iter()
            .map(|doc| -> Result<Box<dyn Constraint>> {
                let constraint: Box<dyn Constraint> = match doc {
                    ConstraintDoc::Constant { slot, value } => {
                        Box::new(ConstantConstraint::new(*slot, parse_value(value)?))
                    }
                    ConstraintDoc::Collection { slot, values } => {
                        let values = values
                            .iter()
                            .map(|v| parse_value(v))
                            .collect::<Result<Vec<_>>>()?;
                        Box::new(CollectionConstraint::new(*slot, values))
                    }
                    ConstraintDoc::Triple { pattern } => Box::new(TripleConstraint::new(set, *pattern)),
                };
                Ok(constraint)
            })
            .collect()
    }
}

pub fn load_query(path: &Path) -> Result<QueryDoc> {
    let json = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("parsing {}", path.display()))
}

// ============================================================================
// Patterns over named variables
// ============================================================================

/// `?name` is a named variable, `_` a fresh unnamed one; anything else is
/// a literal.
fn parse_term(ctx: &mut VariableContext, text: &str, id_position: bool) -> Result<Term> {
    if text == "_" {
        return Ok(ctx.unnamed().into());
    }
    if let Some(name) = text.strip_prefix('?') {
        return Ok(ctx.named(name).into());
    }
    if id_position {
        Ok(parse_id(text)?.into())
    } else {
        Ok(parse_value(text)?.into())
    }
}

/// Add one `"E A V"` pattern to `ctx`. A value variable that also sits
/// in an entity or attribute position somewhere is read as an id; other
/// values are read as `kind`.
pub fn add_pattern(
    ctx: &mut VariableContext,
    set: &TribleSet,
    pattern: &str,
    kind: ValueKind,
    id_variables: &BTreeSet<String>,
) -> Result<()> {
    let parts: Vec<&str> = pattern.split_whitespace().collect();
    let [e, a, v] = parts[..] else {
        bail!("pattern `{pattern}` must have exactly three terms");
    };
    let kind = match v.strip_prefix('?') {
        Some(name) if id_variables.contains(name) => ValueKind::Id,
        _ => kind,
    };
    let e = parse_term(ctx, e, true)?;
    let a = parse_term(ctx, a, true)?;
    let v = parse_term(ctx, v, false)?;
    ctx.pattern(set, e, a, v, kind)?;
    Ok(())
}

/// Names of the `?variables` used as entities or attributes.
pub fn id_variables(patterns: &[String]) -> BTreeSet<String> {
    patterns
        .iter()
        .flat_map(|p| p.split_whitespace().take(2))
        .filter_map(|term| term.strip_prefix('?'))
        .map(str::to_string)
        .collect()
}

/// Names of the `?variables` mentioned in `patterns`, in first-use order.
pub fn variable_names(patterns: &[String]) -> Vec<String> {
    let mut seen: BTreeMap<String, usize> = BTreeMap::new();
    for term in patterns.iter().flat_map(|p| p.split_whitespace()) {
        if let Some(name) = term.strip_prefix('?') {
            let next = seen.len();
            seen.entry(name.to_string()).or_insert(next);
        }
    }
    let mut names: Vec<(usize, String)> = seen.into_iter().map(|(n, i)| (i, n)).collect();
    names.sort();
    names.into_iter().map(|(_, n)| n).collect()
}

pub fn named(ctx: &mut VariableContext, names: &[String]) -> Vec<(String, Variable)> {
    names.iter().map(|n| (n.clone(), ctx.named(n))).collect()
}
