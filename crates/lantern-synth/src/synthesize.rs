//! Type-directed value synthesis and mutation.
//!
//! Dispatch is purely on the [`TypeDescriptor`] kind:
//! - **primitives**: drawn or perturbed within the configured deltas.
//! - **pointers**: `None` with the nil probability, otherwise a boxed pointee.
//! - **structs**: exported fields only; injector overrides win per field.
//! - **slices / maps**: a few fresh elements when empty, otherwise a
//!   probabilistic mix of element mutation and appends.
//! - **interfaces**: the four known shapes or an injector entry.
//! - **functions**: stubs returning synthesized results.
//!
//! Termination on self-referential graphs relies only on the depth counter
//! carried in [`SynthesisContext`]; there is no visited set.

use lantern_ir::{KnownInterface, PrimitiveKind, TypeDescriptor, TypeError, TypeTable};
use rand::distributions::Alphanumeric;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::context::{InjectorEntry, SynthConfig, SynthesisContext};
use crate::value::{InterfaceValue, Value};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SynthError {
    #[error("unsynthesizable interface '{name}': supply an injector override")]
    UnsynthesizableInterface { name: String },

    #[error("type error: {0}")]
    Type(#[from] TypeError),
}

/// Generates and perturbs values for one candidate.
pub struct Synthesizer<'t> {
    table: &'t TypeTable,
    config: SynthConfig,
    rng: ChaCha8Rng,
    deepest: u32,
}

impl<'t> Synthesizer<'t> {
    pub fn new(table: &'t TypeTable, config: SynthConfig, rng: ChaCha8Rng) -> Self {
        Self {
            table,
            config,
            rng,
            deepest: 0,
        }
    }

    pub fn config(&self) -> &SynthConfig {
        &self.config
    }

    /// Deepest struct nesting any call has reached so far.
    pub fn deepest(&self) -> u32 {
        self.deepest
    }

    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    /// Produce a fresh value of shape `ty`.
    pub fn synthesize(
        &mut self,
        ctx: SynthesisContext<'_>,
        ty: &TypeDescriptor,
    ) -> Result<Value, SynthError> {
        self.deepest = self.deepest.max(ctx.depth);

        if let Some(value) = self.injected(ctx, ty) {
            return Ok(value);
        }

        let table = self.table;
        match ty {
            TypeDescriptor::Named { name } => {
                if ctx.hops >= self.config.max_named_hops {
                    return Ok(Value::Zero);
                }
                let resolved = table.resolve(name)?;
                self.synthesize(ctx.hop(), resolved)
            }
            TypeDescriptor::Primitive { primitive, alias } => {
                let inner = self.fresh_primitive(*primitive);
                Ok(wrap_alias(alias, inner))
            }
            TypeDescriptor::Pointer { pointee } => {
                if ctx.depth >= self.config.max_depth || self.roll_nil(ctx) {
                    return Ok(Value::Nil);
                }
                let inner = self.synthesize(ctx, pointee)?;
                Ok(Value::Pointer(Box::new(inner)))
            }
            TypeDescriptor::Slice { element, len } => {
                let count = match len {
                    Some(n) => *n,
                    None if ctx.depth >= self.config.max_depth => 0,
                    None => self.rng.gen_range(0..=self.config.max_fresh_elements),
                };
                let mut elements = Vec::with_capacity(count);
                for _ in 0..count {
                    elements.push(self.synthesize(ctx, element)?);
                }
                Ok(Value::Seq {
                    elements,
                    fixed: len.is_some(),
                })
            }
            TypeDescriptor::Map { key, value } => {
                let count = if ctx.depth >= self.config.max_depth {
                    0
                } else {
                    self.rng.gen_range(0..=self.config.max_fresh_elements)
                };
                let mut entries: Vec<(Value, Value)> = Vec::with_capacity(count);
                for _ in 0..count {
                    let k = self.synthesize(ctx, key)?;
                    if entries.iter().any(|(existing, _)| *existing == k) {
                        continue;
                    }
                    let v = self.synthesize(ctx, value)?;
                    entries.push((k, v));
                }
                Ok(Value::Map(entries))
            }
            TypeDescriptor::Struct { name, path, fields } => {
                if ctx.depth >= self.config.max_depth {
                    return Ok(Value::Zero);
                }
                let child = ctx.descend();
                let mut values = Vec::with_capacity(fields.len());
                for field in fields.iter().filter(|f| f.exported) {
                    let value = self.synthesize(child, &field.ty)?;
                    values.push((field.name.clone(), value));
                }
                Ok(Value::Struct {
                    name: name.clone(),
                    path: path.clone(),
                    fields: values,
                    complete: fields.iter().all(|f| f.exported),
                })
            }
            TypeDescriptor::Function {
                params,
                results,
                boxed,
            } => {
                let mut values = Vec::with_capacity(results.len());
                for result in results {
                    values.push(self.synthesize(ctx, result)?);
                }
                Ok(Value::Func {
                    arity: params.len(),
                    results: values,
                    boxed: *boxed,
                })
            }
            TypeDescriptor::Interface { name } => match KnownInterface::from_name(name) {
                Some(known) => Ok(Value::Interface(self.fresh_interface(known))),
                None => Err(SynthError::UnsynthesizableInterface { name: name.clone() }),
            },
        }
    }

    /// Perturb `existing`, a value previously produced for `ty`.
    ///
    /// A value that does not fit the shape is replaced by a fresh one.
    pub fn mutate(
        &mut self,
        ctx: SynthesisContext<'_>,
        ty: &TypeDescriptor,
        existing: &Value,
    ) -> Result<Value, SynthError> {
        self.deepest = self.deepest.max(ctx.depth);

        if let Value::Injected { .. } = existing {
            return Ok(self
                .injected(ctx, ty)
                .unwrap_or_else(|| existing.clone()));
        }

        let table = self.table;
        match (ty, existing) {
            (_, Value::Zero) => self.synthesize(ctx, ty),
            (TypeDescriptor::Named { name }, _) => {
                if ctx.hops >= self.config.max_named_hops {
                    return Ok(existing.clone());
                }
                let resolved = table.resolve(name)?;
                self.mutate(ctx.hop(), resolved, existing)
            }
            (TypeDescriptor::Primitive { alias, .. }, Value::Alias { inner, .. }) => {
                let inner = self.perturb_primitive(inner);
                Ok(wrap_alias(alias, inner))
            }
            (TypeDescriptor::Primitive { alias: None, .. }, primitive)
                if is_primitive_value(primitive) =>
            {
                Ok(self.perturb_primitive(primitive))
            }
            (TypeDescriptor::Pointer { pointee }, Value::Nil) => {
                if ctx.depth >= self.config.max_depth || self.roll_nil(ctx) {
                    return Ok(Value::Nil);
                }
                let inner = self.synthesize(ctx, pointee)?;
                Ok(Value::Pointer(Box::new(inner)))
            }
            (TypeDescriptor::Pointer { pointee }, Value::Pointer(inner)) => {
                if ctx.depth >= self.config.max_depth || self.roll_nil(ctx) {
                    return Ok(Value::Nil);
                }
                let inner = self.mutate(ctx, pointee, inner)?;
                Ok(Value::Pointer(Box::new(inner)))
            }
            (TypeDescriptor::Slice { element, len }, Value::Seq { elements, .. }) => {
                self.mutate_seq(ctx, element, *len, elements)
            }
            (TypeDescriptor::Map { key, value }, Value::Map(entries)) => {
                self.mutate_map(ctx, key, value, entries)
            }
            (
                TypeDescriptor::Struct { fields, .. },
                Value::Struct {
                    name,
                    path,
                    fields: values,
                    complete,
                },
            ) => {
                if ctx.depth >= self.config.max_depth {
                    return Ok(Value::Zero);
                }
                let child = ctx.descend();
                let mut mutated = Vec::with_capacity(values.len());
                for field in fields.iter().filter(|f| f.exported) {
                    let current = values
                        .iter()
                        .find(|(n, _)| *n == field.name)
                        .map(|(_, v)| v);
                    let value = match current {
                        Some(v) if self.roll(self.config.element_mutate_probability) => {
                            self.mutate(child, &field.ty, v)?
                        }
                        Some(v) => v.clone(),
                        None => self.synthesize(child, &field.ty)?,
                    };
                    mutated.push((field.name.clone(), value));
                }
                Ok(Value::Struct {
                    name: name.clone(),
                    path: path.clone(),
                    fields: mutated,
                    complete: *complete,
                })
            }
            (TypeDescriptor::Function { results, .. }, Value::Func { arity, results: old, boxed }) => {
                let mut values = Vec::with_capacity(results.len());
                for (i, result_ty) in results.iter().enumerate() {
                    let value = match old.get(i) {
                        Some(v) => self.mutate(ctx, result_ty, v)?,
                        None => self.synthesize(ctx, result_ty)?,
                    };
                    values.push(value);
                }
                Ok(Value::Func {
                    arity: *arity,
                    results: values,
                    boxed: *boxed,
                })
            }
            (TypeDescriptor::Interface { .. }, Value::Interface(current)) => {
                Ok(Value::Interface(self.perturb_interface(current)))
            }
            _ => {
                log::debug!(
                    "value does not fit {} shape, synthesizing afresh",
                    ty.kind_name()
                );
                self.synthesize(ctx, ty)
            }
        }
    }

    /// The zero value of a shape.
    pub fn zero_value(&self, ty: &TypeDescriptor) -> Value {
        match ty {
            TypeDescriptor::Pointer { .. } => Value::Nil,
            TypeDescriptor::Slice { len: None, .. } => Value::Seq {
                elements: Vec::new(),
                fixed: false,
            },
            TypeDescriptor::Map { .. } => Value::Map(Vec::new()),
            _ => Value::Zero,
        }
    }

    fn injected(&mut self, ctx: SynthesisContext<'_>, ty: &TypeDescriptor) -> Option<Value> {
        let name = ty.type_name()?;
        let entries = ctx.injectors.lookup(name)?;
        let entry: &InjectorEntry = &entries[self.rng.gen_range(0..entries.len())];
        Some(Value::Injected {
            type_name: name.to_string(),
            literal: entry.literal.clone(),
            imports: entry.imports.clone(),
        })
    }

    fn roll(&mut self, probability: f64) -> bool {
        self.rng.gen_bool(probability.clamp(0.0, 1.0))
    }

    fn roll_nil(&mut self, ctx: SynthesisContext<'_>) -> bool {
        ctx.may_be_nil && self.roll(self.config.nil_probability)
    }

    fn fresh_primitive(&mut self, kind: PrimitiveKind) -> Value {
        match kind {
            PrimitiveKind::Bool => Value::Bool(self.rng.gen_bool(0.5)),
            PrimitiveKind::F32 | PrimitiveKind::F64 => {
                let delta = self.config.float_delta.abs().max(f64::EPSILON);
                let value = self.rng.gen_range(-delta..delta);
                Value::Float {
                    value: round_float(value, kind),
                    kind,
                }
            }
            PrimitiveKind::Char => Value::Char(self.rng.sample(Alphanumeric) as char),
            PrimitiveKind::String | PrimitiveKind::Str => {
                let len = self.rng.gen_range(0..=self.config.max_string_len);
                Value::Text {
                    value: self.random_text(len),
                    kind,
                }
            }
            _ => {
                let delta = self.config.int_delta.unsigned_abs() as i128;
                let value = self.rng.gen_range(-delta..=delta);
                Value::Int {
                    value: clamp_int(value, kind),
                    kind,
                }
            }
        }
    }

    fn perturb_primitive(&mut self, value: &Value) -> Value {
        match value {
            Value::Bool(b) => {
                let flip = self.roll(self.config.bool_flip_probability);
                Value::Bool(*b ^ flip)
            }
            Value::Int { value, kind } => {
                let delta = self.config.int_delta.unsigned_abs() as i128;
                let step = self.rng.gen_range(-delta..=delta);
                Value::Int {
                    value: clamp_int(value.saturating_add(step), *kind),
                    kind: *kind,
                }
            }
            Value::Float { value, kind } => {
                let delta = self.config.float_delta.abs().max(f64::EPSILON);
                let step = self.rng.gen_range(-delta..delta);
                Value::Float {
                    value: round_float(value + step, *kind),
                    kind: *kind,
                }
            }
            Value::Char(_) => Value::Char(self.rng.sample(Alphanumeric) as char),
            Value::Text { value, kind } => Value::Text {
                value: self.edit_text(value),
                kind: *kind,
            },
            other => other.clone(),
        }
    }

    fn random_text(&mut self, len: usize) -> String {
        (0..len)
            .map(|_| self.rng.sample(Alphanumeric) as char)
            .collect()
    }

    /// One random insert, delete or replace, keeping the length bounded.
    fn edit_text(&mut self, text: &str) -> String {
        let mut chars: Vec<char> = text.chars().collect();
        let fresh = self.rng.sample(Alphanumeric) as char;
        let can_grow = chars.len() < self.config.max_string_len;
        match (chars.is_empty(), self.rng.gen_range(0..3)) {
            (true, _) | (false, 0) if can_grow => {
                let at = self.rng.gen_range(0..=chars.len());
                chars.insert(at, fresh);
            }
            (false, 1) => {
                let at = self.rng.gen_range(0..chars.len());
                chars.remove(at);
            }
            (false, _) => {
                let at = self.rng.gen_range(0..chars.len());
                chars[at] = fresh;
            }
            (true, _) => {}
        }
        chars.into_iter().collect()
    }

    fn fresh_interface(&mut self, known: KnownInterface) -> InterfaceValue {
        match known {
            KnownInterface::Error => {
                let len = self.config.max_string_len.max(1);
                let suffix = self.random_text(len);
                InterfaceValue::Error {
                    message: format!("synthetic error {suffix}"),
                }
            }
            KnownInterface::ByteSink => InterfaceValue::ByteSink,
            KnownInterface::ByteSource => {
                let len = self.rng.gen_range(0..=self.config.max_string_len);
                let bytes = (0..len).map(|_| self.rng.gen()).collect();
                InterfaceValue::ByteSource { bytes }
            }
            KnownInterface::Cancellation => InterfaceValue::Cancellation {
                cancelled: self.rng.gen_bool(0.5),
            },
        }
    }

    fn perturb_interface(&mut self, current: &InterfaceValue) -> InterfaceValue {
        match current {
            InterfaceValue::Error { message } => InterfaceValue::Error {
                message: self.edit_text(message),
            },
            InterfaceValue::ByteSink => InterfaceValue::ByteSink,
            InterfaceValue::ByteSource { bytes } => {
                let mut bytes = bytes.clone();
                if !bytes.is_empty() && self.roll(self.config.element_mutate_probability) {
                    let at = self.rng.gen_range(0..bytes.len());
                    bytes[at] = self.rng.gen();
                }
                if self.roll(self.config.append_probability) {
                    bytes.push(self.rng.gen());
                }
                InterfaceValue::ByteSource { bytes }
            }
            InterfaceValue::Cancellation { cancelled } => {
                let flip = self.roll(self.config.bool_flip_probability);
                InterfaceValue::Cancellation {
                    cancelled: *cancelled ^ flip,
                }
            }
        }
    }

    fn mutate_seq(
        &mut self,
        ctx: SynthesisContext<'_>,
        element: &TypeDescriptor,
        len: Option<usize>,
        elements: &[Value],
    ) -> Result<Value, SynthError> {
        let fixed = len.is_some();
        if elements.is_empty() && !fixed {
            return self.synthesize(ctx, &TypeDescriptor::Slice {
                element: Box::new(element.clone()),
                len: None,
            });
        }

        let mut out = Vec::with_capacity(elements.len() + 1);
        for current in elements {
            if self.roll(self.config.element_mutate_probability) {
                out.push(self.mutate(ctx, element, current)?);
            } else {
                out.push(current.clone());
            }
        }
        // A fixed array that drifted from its declared length is rebuilt.
        if let Some(n) = len {
            out.truncate(n);
            while out.len() < n {
                out.push(self.synthesize(ctx, element)?);
            }
        } else if ctx.depth < self.config.max_depth && self.roll(self.config.append_probability) {
            out.push(self.synthesize(ctx, element)?);
        }
        Ok(Value::Seq {
            elements: out,
            fixed,
        })
    }

    fn mutate_map(
        &mut self,
        ctx: SynthesisContext<'_>,
        key: &TypeDescriptor,
        value: &TypeDescriptor,
        entries: &[(Value, Value)],
    ) -> Result<Value, SynthError> {
        if entries.is_empty() {
            return self.synthesize(ctx, &TypeDescriptor::map(key.clone(), value.clone()));
        }

        let mut out = Vec::with_capacity(entries.len() + 1);
        for (k, v) in entries {
            // Keys stay put so the map never gains duplicates.
            let v = if self.roll(self.config.element_mutate_probability) {
                self.mutate(ctx, value, v)?
            } else {
                v.clone()
            };
            out.push((k.clone(), v));
        }
        if ctx.depth < self.config.max_depth && self.roll(self.config.append_probability) {
            let k = self.synthesize(ctx, key)?;
            if !out.iter().any(|(existing, _)| *existing == k) {
                let v = self.synthesize(ctx, value)?;
                out.push((k, v));
            }
        }
        Ok(Value::Map(out))
    }
}

fn wrap_alias(alias: &Option<String>, inner: Value) -> Value {
    match alias {
        Some(name) => Value::Alias {
            name: name.clone(),
            inner: Box::new(inner),
        },
        None => inner,
    }
}

fn is_primitive_value(value: &Value) -> bool {
    matches!(
        value,
        Value::Bool(_)
            | Value::Int { .. }
            | Value::Float { .. }
            | Value::Char(_)
            | Value::Text { .. }
    )
}

fn clamp_int(value: i128, kind: PrimitiveKind) -> i128 {
    match kind.int_bounds() {
        Some((min, max)) => value.clamp(min, max),
        None => value,
    }
}

fn round_float(value: f64, kind: PrimitiveKind) -> f64 {
    match kind {
        PrimitiveKind::F32 => value as f32 as f64,
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::InjectorTable;
    use crate::rng::candidate_rng;

    fn synth(table: &TypeTable) -> Synthesizer<'_> {
        Synthesizer::new(table, SynthConfig::default(), candidate_rng(7, 0))
    }

    #[test]
    fn test_unsigned_ints_stay_in_range() {
        let table = TypeTable::new();
        let mut s = synth(&table);
        let ctx = SynthesisContext::new(InjectorTable::empty());
        let ty = TypeDescriptor::primitive(PrimitiveKind::U8);
        let mut value = s.synthesize(ctx, &ty).unwrap();
        for _ in 0..200 {
            value = s.mutate(ctx, &ty, &value).unwrap();
            match value {
                Value::Int { value, .. } => assert!((0..=255).contains(&value)),
                ref other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_fixed_array_keeps_length() {
        let table = TypeTable::new();
        let mut s = synth(&table);
        let ctx = SynthesisContext::new(InjectorTable::empty());
        let ty = TypeDescriptor::array(TypeDescriptor::primitive(PrimitiveKind::I32), 3);
        let mut value = s.synthesize(ctx, &ty).unwrap();
        for _ in 0..20 {
            value = s.mutate(ctx, &ty, &value).unwrap();
            match &value {
                Value::Seq { elements, fixed } => {
                    assert!(*fixed);
                    assert_eq!(elements.len(), 3);
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_text_edits_stay_bounded() {
        let table = TypeTable::new();
        let mut s = synth(&table);
        let ctx = SynthesisContext::new(InjectorTable::empty());
        let ty = TypeDescriptor::primitive(PrimitiveKind::String);
        let mut value = s.synthesize(ctx, &ty).unwrap();
        for _ in 0..100 {
            value = s.mutate(ctx, &ty, &value).unwrap();
            match &value {
                Value::Text { value, .. } => assert!(value.chars().count() <= 8),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_never_nil_when_disallowed() {
        let table = TypeTable::new();
        let config = SynthConfig {
            nil_probability: 1.0,
            ..Default::default()
        };
        let mut s = Synthesizer::new(&table, config, candidate_rng(1, 1));
        let ctx = SynthesisContext::new(InjectorTable::empty()).with_nil(false);
        let ty = TypeDescriptor::pointer(TypeDescriptor::primitive(PrimitiveKind::Bool));
        let value = s.synthesize(ctx, &ty).unwrap();
        assert!(matches!(value, Value::Pointer(_)));
    }

    #[test]
    fn test_out_of_range_nil_probability_is_clamped() {
        let table = TypeTable::new();
        let ty = TypeDescriptor::pointer(TypeDescriptor::primitive(PrimitiveKind::Bool));
        let ctx = SynthesisContext::new(InjectorTable::empty());
        for (probability, expect_nil) in [(1.5, true), (-0.5, false)] {
            let config = SynthConfig {
                nil_probability: probability,
                ..Default::default()
            };
            let mut s = Synthesizer::new(&table, config, candidate_rng(3, 0));
            for _ in 0..20 {
                let value = s.mutate(ctx, &ty, &Value::Nil).unwrap();
                assert_eq!(matches!(value, Value::Nil), expect_nil);
            }
        }
    }

    #[test]
    fn test_mismatched_value_is_replaced() {
        let table = TypeTable::new();
        let mut s = synth(&table);
        let ctx = SynthesisContext::new(InjectorTable::empty());
        let ty = TypeDescriptor::primitive(PrimitiveKind::Bool);
        let value = s.mutate(ctx, &ty, &Value::Map(Vec::new())).unwrap();
        assert!(matches!(value, Value::Bool(_)));
    }
}
