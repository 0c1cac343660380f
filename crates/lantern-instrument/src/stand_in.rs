//! Call sites of mocked callees consult the runtime's stand-in queue.
//!
//! `fetch(key)` becomes
//! `(match ::lantern_runtime::mock::next("fetch") { Some(v) => v, None => fetch(key) })`,
//! so a candidate that queued a value steers the path and one that did not
//! runs the real callee.

use std::collections::BTreeMap;

use proc_macro2::{Ident, Span, TokenStream};
use syn::visit_mut::{self, VisitMut};
use syn::{parse_quote, Block, Expr, Item, Macro};

use crate::RECORDER_IDENT;

const STAND_IN_IDENT: &str = "__lantern_stand_in";

/// A mocked callee as `name` or `Owner::name`.
struct Callee<'c> {
    key: &'c str,
    owner: Option<&'c str>,
    name: &'c str,
}

impl<'c> Callee<'c> {
    fn parse(key: &'c str) -> Self {
        match key.rsplit_once("::") {
            Some((owner, name)) => Callee {
                key,
                owner: Some(owner.rsplit("::").next().unwrap_or(owner)),
                name,
            },
            None => Callee {
                key,
                owner: None,
                name: key,
            },
        }
    }

    /// Path callees match on the last segment, and on the segment before it
    /// when an owner is given (`Self` stands in for any owner).
    fn matches_path(&self, path: &syn::Path) -> bool {
        let segments: Vec<&Ident> = path.segments.iter().map(|s| &s.ident).collect();
        if segments.first().is_some_and(|first| *first == "lantern_runtime") {
            return false;
        }
        let Some((last, parents)) = segments.split_last() else {
            return false;
        };
        if *last != self.name {
            return false;
        }
        match self.owner {
            None => true,
            Some(owner) => parents
                .last()
                .is_some_and(|parent| *parent == owner || *parent == "Self"),
        }
    }
}

/// Rewrites calls to the given callees inside one body. Returns the number
/// of call sites rewritten per callee.
pub(crate) fn route_calls(body: &mut Block, callees: &[String]) -> BTreeMap<String, usize> {
    let mut router = Router {
        callees: callees.iter().map(|c| Callee::parse(c)).collect(),
        sites: callees.iter().map(|c| (c.clone(), 0)).collect(),
    };
    if !callees.is_empty() {
        router.visit_block_mut(body);
    }
    router.sites
}

struct Router<'c> {
    callees: Vec<Callee<'c>>,
    sites: BTreeMap<String, usize>,
}

impl Router<'_> {
    fn callee_for(&self, expr: &Expr) -> Option<&str> {
        match expr {
            Expr::Call(call) => match call.func.as_ref() {
                Expr::Path(func) if func.qself.is_none() => self
                    .callees
                    .iter()
                    .find(|c| c.matches_path(&func.path))
                    .map(|c| c.key),
                _ => None,
            },
            Expr::MethodCall(call) => {
                let on_recorder = matches!(
                    call.receiver.as_ref(),
                    Expr::Path(receiver) if receiver.path.is_ident(RECORDER_IDENT)
                );
                if on_recorder {
                    return None;
                }
                self.callees
                    .iter()
                    .find(|c| call.method == c.name)
                    .map(|c| c.key)
            }
            _ => None,
        }
    }
}

impl VisitMut for Router<'_> {
    fn visit_expr_mut(&mut self, expr: &mut Expr) {
        visit_mut::visit_expr_mut(self, expr);
        let Some(key) = self.callee_for(expr).map(str::to_string) else {
            return;
        };
        let value = Ident::new(STAND_IN_IDENT, Span::call_site());
        let call = std::mem::replace(expr, Expr::Verbatim(TokenStream::new()));
        // Parenthesized so a match on the left of a binary operator in
        // statement position still parses as an expression.
        *expr = parse_quote! {
            (match ::lantern_runtime::mock::next(#key) {
                ::core::option::Option::Some(#value) => #value,
                ::core::option::Option::None => #call,
            })
        };
        if let Some(count) = self.sites.get_mut(&key) {
            *count += 1;
        }
    }

    // Macro bodies are opaque token streams.
    fn visit_macro_mut(&mut self, _mac: &mut Macro) {}

    // Nested items are separate functions.
    fn visit_item_mut(&mut self, _item: &mut Item) {}
}
