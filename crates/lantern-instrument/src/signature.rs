//! Target signatures and unit type tables, derived from `syn` types.

use lantern_ir::types::{FieldDescriptor, PrimitiveKind, TypeDescriptor, TypeTable};
use quote::ToTokens;
use syn::punctuated::Punctuated;
use syn::{
    Expr, FnArg, Fields, GenericArgument, ImplItem, Item, Lit, Pat, PathArguments, ReturnType,
    Token, Type, TypeParamBound, Visibility,
};

use crate::rewrite::{result_arity, self_type_name, InstrumentError, TargetPath};

/// How an argument is handed to the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Passing {
    Value,
    Ref,
    RefMut,
}

impl Passing {
    /// Prefix applied to a rendered argument.
    pub fn prefix(self) -> &'static str {
        match self {
            Passing::Value => "",
            Passing::Ref => "&",
            Passing::RefMut => "&mut ",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub ty: TypeDescriptor,
    pub passing: Passing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TargetSignature {
    pub name: String,
    /// Type of the `impl` block for methods and associated functions.
    pub owner: Option<String>,
    /// `self` parameter, when the target is a method.
    pub receiver: Option<Passing>,
    pub params: Vec<ParamSpec>,
    pub is_async: bool,
    pub result_arity: usize,
}

/// Extract the signature of `target` from a source unit.
pub fn extract_signature(source: &str, target: &str) -> Result<TargetSignature, InstrumentError> {
    let file = parse(source)?;
    let path = TargetPath::parse(target);
    let not_found = || InstrumentError::TargetNotFound {
        target: target.to_string(),
        file: "<source>".to_string(),
    };

    let sig = file
        .items
        .iter()
        .find_map(|item| match item {
            Item::Fn(node) if path.owner.is_none() && node.sig.ident == path.name => {
                Some(&node.sig)
            }
            Item::Impl(node) if path.owner.is_some() && self_type_name(&node.self_ty) == path.owner => {
                node.items.iter().find_map(|impl_item| match impl_item {
                    ImplItem::Fn(method) if method.sig.ident == path.name => Some(&method.sig),
                    _ => None,
                })
            }
            _ => None,
        })
        .ok_or_else(not_found)?;

    let mut receiver = None;
    let mut params = Vec::new();
    for (index, input) in sig.inputs.iter().enumerate() {
        match input {
            FnArg::Receiver(recv) => {
                receiver = Some(match (&recv.reference, &recv.mutability) {
                    (Some(_), Some(_)) => Passing::RefMut,
                    (Some(_), None) => Passing::Ref,
                    (None, _) => Passing::Value,
                });
            }
            FnArg::Typed(typed) => {
                let name = match typed.pat.as_ref() {
                    Pat::Ident(ident) => ident.ident.to_string(),
                    _ => format!("arg{index}"),
                };
                let (ty, passing) = describe_param(&typed.ty);
                params.push(ParamSpec { name, ty, passing });
            }
        }
    }

    Ok(TargetSignature {
        name: path.name.clone(),
        owner: path.owner.clone(),
        receiver,
        params,
        is_async: sig.asyncness.is_some(),
        result_arity: result_arity(&sig.output),
    })
}

/// Build the type table for the unit's structs, newtypes and aliases.
///
/// Struct paths are `module_path::Name`. Generic items are skipped; a
/// reference to one stays unresolved and its parameter is left to the user.
pub fn collect_types(source: &str, module_path: &str) -> Result<TypeTable, InstrumentError> {
    let file = parse(source)?;
    let mut table = TypeTable::new();

    for item in &file.items {
        match item {
            Item::Struct(node) if node.generics.params.is_empty() => {
                let name = node.ident.to_string();
                let defaulted = derives_default(&node.attrs);
                match &node.fields {
                    Fields::Unnamed(fields) if fields.unnamed.len() == 1 => {
                        let inner = describe_type(&fields.unnamed[0].ty);
                        if let TypeDescriptor::Primitive { primitive, alias: None } = inner {
                            table.insert(name.clone(), TypeDescriptor::alias(primitive, name));
                        }
                    }
                    Fields::Unnamed(_) => {}
                    fields => {
                        let fields = fields
                            .iter()
                            .filter_map(|field| {
                                let ident = field.ident.as_ref()?;
                                let ty = describe_type(&field.ty);
                                // Without `Default` the struct literal must name
                                // every field; the suite module can see them all.
                                let exported = !defaulted
                                    || !matches!(field.vis, Visibility::Inherited);
                                Some(FieldDescriptor {
                                    name: ident.to_string(),
                                    exported,
                                    ty,
                                })
                            })
                            .collect();
                        table.insert(
                            name.clone(),
                            TypeDescriptor::Struct {
                                path: Some(format!("{module_path}::{name}")),
                                name,
                                fields,
                            },
                        );
                    }
                }
            }
            Item::Type(node) if node.generics.params.is_empty() => {
                table.insert(node.ident.to_string(), describe_type(&node.ty));
            }
            _ => {}
        }
    }
    Ok(table)
}

fn parse(source: &str) -> Result<syn::File, InstrumentError> {
    syn::parse_file(source).map_err(|e| InstrumentError::Parse {
        file: "<source>".to_string(),
        message: e.to_string(),
    })
}

fn derives_default(attrs: &[syn::Attribute]) -> bool {
    attrs.iter().any(|attr| {
        attr.path().is_ident("derive")
            && attr
                .parse_args_with(Punctuated::<syn::Path, Token![,]>::parse_terminated)
                .is_ok_and(|paths| {
                    paths
                        .iter()
                        .any(|p| p.segments.last().is_some_and(|s| s.ident == "Default"))
                })
    })
}

fn describe_param(ty: &Type) -> (TypeDescriptor, Passing) {
    match ty {
        Type::Reference(reference) => {
            if is_str(&reference.elem) {
                return (TypeDescriptor::primitive(PrimitiveKind::Str), Passing::Value);
            }
            let passing = if reference.mutability.is_some() {
                Passing::RefMut
            } else {
                Passing::Ref
            };
            (describe_type(&reference.elem), passing)
        }
        other => (describe_type(other), Passing::Value),
    }
}

/// Map a `syn` type onto a [`TypeDescriptor`]. Types with no structural
/// counterpart become `named` references by their last path segment.
pub fn describe_type(ty: &Type) -> TypeDescriptor {
    match ty {
        Type::Paren(inner) => describe_type(&inner.elem),
        Type::Group(inner) => describe_type(&inner.elem),
        Type::Reference(reference) if is_str(&reference.elem) => {
            TypeDescriptor::primitive(PrimitiveKind::Str)
        }
        Type::Reference(reference) => describe_type(&reference.elem),
        Type::Slice(slice) => TypeDescriptor::slice(describe_type(&slice.elem)),
        Type::Array(array) => match array_len(&array.len) {
            Some(len) => TypeDescriptor::array(describe_type(&array.elem), len),
            None => named(ty),
        },
        Type::BareFn(bare) => TypeDescriptor::Function {
            params: bare.inputs.iter().map(|arg| describe_type(&arg.ty)).collect(),
            results: results(&bare.output),
            boxed: false,
        },
        Type::ImplTrait(node) => describe_bounds(node.bounds.iter(), false).unwrap_or_else(|| named(ty)),
        Type::TraitObject(node) => describe_bounds(node.bounds.iter(), false).unwrap_or_else(|| named(ty)),
        Type::Path(path) if path.qself.is_none() => {
            let Some(last) = path.path.segments.last() else {
                return named(ty);
            };
            let ident = last.ident.to_string();
            let args = generic_types(&last.arguments);
            if let Some(kind) = PrimitiveKind::from_rust_name(&ident) {
                if args.is_empty() && kind != PrimitiveKind::Str {
                    return TypeDescriptor::primitive(kind);
                }
            }
            match (ident.as_str(), args.as_slice()) {
                ("Option", [inner]) => match box_inner(inner) {
                    Some(pointee) => TypeDescriptor::pointer(describe_type(pointee)),
                    None => named(ty),
                },
                ("Vec", [element]) => TypeDescriptor::slice(describe_type(element)),
                ("HashMap", [key, value]) => {
                    TypeDescriptor::map(describe_type(key), describe_type(value))
                }
                ("Box", [Type::TraitObject(object)]) => {
                    describe_bounds(object.bounds.iter(), true).unwrap_or_else(|| named(ty))
                }
                ("CancellationToken", []) => TypeDescriptor::interface("CancellationToken"),
                (_, []) => TypeDescriptor::named(ident),
                _ => named(ty),
            }
        }
        _ => named(ty),
    }
}

fn named(ty: &Type) -> TypeDescriptor {
    let text = ty.to_token_stream().to_string().replace(' ', "");
    TypeDescriptor::named(text)
}

fn is_str(ty: &Type) -> bool {
    matches!(ty, Type::Path(path) if path.qself.is_none() && path.path.is_ident("str"))
}

fn box_inner(ty: &Type) -> Option<&Type> {
    let Type::Path(path) = ty else {
        return None;
    };
    let last = path.path.segments.last()?;
    if last.ident != "Box" {
        return None;
    }
    match generic_types(&last.arguments).as_slice() {
        [inner] => Some(*inner),
        _ => None,
    }
}

fn generic_types(arguments: &PathArguments) -> Vec<&Type> {
    match arguments {
        PathArguments::AngleBracketed(args) => args
            .args
            .iter()
            .filter_map(|arg| match arg {
                GenericArgument::Type(ty) => Some(ty),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn array_len(len: &Expr) -> Option<usize> {
    match len {
        Expr::Lit(lit) => match &lit.lit {
            Lit::Int(int) => int.base10_parse().ok(),
            _ => None,
        },
        _ => None,
    }
}

fn results(output: &ReturnType) -> Vec<TypeDescriptor> {
    match output {
        ReturnType::Default => Vec::new(),
        ReturnType::Type(_, ty) => match ty.as_ref() {
            Type::Tuple(tuple) => tuple.elems.iter().map(describe_type).collect(),
            other => vec![describe_type(other)],
        },
    }
}

/// `Fn`-family bounds become function stubs; the first other trait bound
/// names an interface.
fn describe_bounds<'b>(
    bounds: impl Iterator<Item = &'b TypeParamBound>,
    boxed: bool,
) -> Option<TypeDescriptor> {
    for bound in bounds {
        let TypeParamBound::Trait(trait_bound) = bound else {
            continue;
        };
        let last = trait_bound.path.segments.last()?;
        let ident = last.ident.to_string();
        if matches!(ident.as_str(), "Fn" | "FnMut" | "FnOnce") {
            let PathArguments::Parenthesized(args) = &last.arguments else {
                return None;
            };
            return Some(TypeDescriptor::Function {
                params: args.inputs.iter().map(describe_type).collect(),
                results: results(&args.output),
                boxed,
            });
        }
        if matches!(ident.as_str(), "Send" | "Sync" | "Unpin") {
            continue;
        }
        return Some(TypeDescriptor::interface(ident));
    }
    None
}
