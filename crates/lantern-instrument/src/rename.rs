//! Per-run uniqueness suffix for the top-level items of a rewritten unit.

use std::collections::{BTreeMap, BTreeSet};

use proc_macro2::{Group, Ident, TokenStream, TokenTree};
use syn::visit_mut::{self, VisitMut};
use syn::{
    Arm, Block, Expr, ExprClosure, ExprForLoop, ExprIf, ExprPath, ExprWhile, FnArg, Fields,
    ImplItemFn, Item, ItemFn, Local, Macro, Pat, PatIdent, Path, ReturnType, Signature,
};

pub(crate) fn suffixed(name: &str, run_id: &str) -> String {
    format!("{name}_lt{run_id}")
}

/// Rename every top-level item and the paths that refer to it.
/// Returns original name -> new name.
///
/// Single-segment value paths naming a binding in scope (a parameter, a
/// `let`, a closure argument or a pattern binding) are locals shadowing
/// the item and keep their name.
pub(crate) fn apply_suffix(file: &mut syn::File, run_id: &str) -> BTreeMap<String, String> {
    let mut renamed = BTreeMap::new();
    let mut pattern_items = BTreeSet::new();
    for item in file.items.iter_mut() {
        let matches_in_patterns = is_pattern_item(item);
        if let Some(ident) = item_ident(item) {
            let original = ident.to_string();
            let new_name = suffixed(&original, run_id);
            *ident = Ident::new(&new_name, ident.span());
            if matches_in_patterns {
                pattern_items.insert(original.clone());
            }
            renamed.insert(original, new_name);
        }
    }

    SuffixPaths {
        renamed: &renamed,
        pattern_items: &pattern_items,
        scopes: Vec::new(),
    }
    .visit_file_mut(file);
    renamed
}

fn item_ident(item: &mut Item) -> Option<&mut Ident> {
    match item {
        Item::Fn(node) => Some(&mut node.sig.ident),
        Item::Struct(node) => Some(&mut node.ident),
        Item::Enum(node) => Some(&mut node.ident),
        Item::Union(node) => Some(&mut node.ident),
        Item::Const(node) => Some(&mut node.ident),
        Item::Static(node) => Some(&mut node.ident),
        Item::Trait(node) => Some(&mut node.ident),
        Item::Type(node) => Some(&mut node.ident),
        _ => None,
    }
}

/// Items a bare identifier pattern resolves to instead of binding.
fn is_pattern_item(item: &Item) -> bool {
    match item {
        Item::Const(_) | Item::Static(_) => true,
        Item::Struct(node) => matches!(node.fields, Fields::Unit),
        _ => false,
    }
}

struct SuffixPaths<'a> {
    renamed: &'a BTreeMap<String, String>,
    pattern_items: &'a BTreeSet<String>,
    /// Local bindings, innermost scope last.
    scopes: Vec<BTreeSet<String>>,
}

impl SuffixPaths<'_> {
    fn is_local(&self, name: &str) -> bool {
        self.scopes.iter().rev().any(|scope| scope.contains(name))
    }

    fn enter(&mut self) {
        self.scopes.push(BTreeSet::new());
    }

    fn leave(&mut self) {
        self.scopes.pop();
    }

    /// Record the bindings introduced by `pat` in the innermost scope.
    fn bind(&mut self, pat: &Pat) {
        let mut names = Vec::new();
        self.bindings(pat, &mut names);
        match self.scopes.last_mut() {
            Some(scope) => scope.extend(names),
            None => self.scopes.push(names.into_iter().collect()),
        }
    }

    fn bindings(&self, pat: &Pat, out: &mut Vec<String>) {
        match pat {
            Pat::Ident(node) => {
                let name = node.ident.to_string();
                let resolves_to_item = node.by_ref.is_none()
                    && node.mutability.is_none()
                    && node.subpat.is_none()
                    && self.pattern_items.contains(&name)
                    && !self.is_local(&name);
                if !resolves_to_item {
                    out.push(name);
                }
                if let Some((_, sub)) = &node.subpat {
                    self.bindings(sub, out);
                }
            }
            Pat::Tuple(node) => node.elems.iter().for_each(|p| self.bindings(p, out)),
            Pat::TupleStruct(node) => node.elems.iter().for_each(|p| self.bindings(p, out)),
            Pat::Struct(node) => node.fields.iter().for_each(|f| self.bindings(&f.pat, out)),
            Pat::Slice(node) => node.elems.iter().for_each(|p| self.bindings(p, out)),
            Pat::Or(node) => {
                if let Some(first) = node.cases.first() {
                    self.bindings(first, out);
                }
            }
            Pat::Reference(node) => self.bindings(&node.pat, out),
            Pat::Type(node) => self.bindings(&node.pat, out),
            Pat::Paren(node) => self.bindings(&node.pat, out),
            _ => {}
        }
    }

    fn rewrite_tokens(&self, tokens: TokenStream) -> TokenStream {
        let trees: Vec<TokenTree> = tokens.into_iter().collect();
        let mut out = Vec::with_capacity(trees.len());
        for (i, tree) in trees.iter().enumerate() {
            match tree {
                TokenTree::Group(group) => {
                    let mut rewritten = Group::new(group.delimiter(), self.rewrite_tokens(group.stream()));
                    rewritten.set_span(group.span());
                    out.push(TokenTree::Group(rewritten));
                }
                TokenTree::Ident(ident) if renamable_at(&trees, i) => {
                    let name = ident.to_string();
                    match self.renamed.get(&name) {
                        Some(new_name) if !self.is_local(&name) => {
                            out.push(TokenTree::Ident(Ident::new(new_name, ident.span())))
                        }
                        _ => out.push(tree.clone()),
                    }
                }
                _ => out.push(tree.clone()),
            }
        }
        out.into_iter().collect()
    }

    /// Function bodies never see the locals of an enclosing body.
    fn visit_fn_parts(&mut self, sig: &mut Signature, block: &mut Block) {
        let outer = std::mem::take(&mut self.scopes);
        self.enter();
        for input in &sig.inputs {
            if let FnArg::Typed(arg) = input {
                self.bind(&arg.pat);
            }
        }
        self.visit_signature_mut(sig);
        self.visit_block_mut(block);
        self.scopes = outer;
    }

    /// `if let` and `while let` bindings are visible in the body only.
    fn visit_guarded(&mut self, cond: &mut Expr, body: &mut Block) {
        self.enter();
        match cond {
            Expr::Let(node) => {
                self.visit_expr_mut(&mut node.expr);
                self.bind(&node.pat);
                self.visit_pat_mut(&mut node.pat);
            }
            other => self.visit_expr_mut(other),
        }
        self.visit_block_mut(body);
        self.leave();
    }
}

impl VisitMut for SuffixPaths<'_> {
    fn visit_path_mut(&mut self, path: &mut Path) {
        if path.leading_colon.is_none() {
            let anchored = path
                .segments
                .first()
                .is_some_and(|s| s.ident == "crate" || s.ident == "self");
            let index = usize::from(anchored && path.segments.len() > 1);
            if let Some(segment) = path.segments.iter_mut().nth(index) {
                if let Some(new_name) = self.renamed.get(&segment.ident.to_string()) {
                    segment.ident = Ident::new(new_name, segment.ident.span());
                }
            }
        }
        visit_mut::visit_path_mut(self, path);
    }

    fn visit_expr_path_mut(&mut self, node: &mut ExprPath) {
        let shadowed = node.qself.is_none()
            && node.path.leading_colon.is_none()
            && node.path.segments.len() == 1
            && self.is_local(&node.path.segments[0].ident.to_string());
        if !shadowed {
            visit_mut::visit_expr_path_mut(self, node);
        }
    }

    fn visit_pat_ident_mut(&mut self, node: &mut PatIdent) {
        let name = node.ident.to_string();
        let resolves_to_item = node.by_ref.is_none()
            && node.mutability.is_none()
            && node.subpat.is_none()
            && !self.is_local(&name);
        if resolves_to_item && self.pattern_items.contains(&name) {
            if let Some(new_name) = self.renamed.get(&name) {
                node.ident = Ident::new(new_name, node.ident.span());
            }
        }
        visit_mut::visit_pat_ident_mut(self, node);
    }

    fn visit_item_fn_mut(&mut self, node: &mut ItemFn) {
        self.visit_fn_parts(&mut node.sig, &mut node.block);
    }

    fn visit_impl_item_fn_mut(&mut self, node: &mut ImplItemFn) {
        self.visit_fn_parts(&mut node.sig, &mut node.block);
    }

    fn visit_block_mut(&mut self, node: &mut Block) {
        self.enter();
        visit_mut::visit_block_mut(self, node);
        self.leave();
    }

    fn visit_local_mut(&mut self, node: &mut Local) {
        if let Some(init) = &mut node.init {
            self.visit_local_init_mut(init);
        }
        self.bind(&node.pat);
        self.visit_pat_mut(&mut node.pat);
    }

    fn visit_expr_closure_mut(&mut self, node: &mut ExprClosure) {
        self.enter();
        for input in &node.inputs {
            self.bind(input);
        }
        for input in node.inputs.iter_mut() {
            self.visit_pat_mut(input);
        }
        if let ReturnType::Type(_, ty) = &mut node.output {
            self.visit_type_mut(ty);
        }
        self.visit_expr_mut(&mut node.body);
        self.leave();
    }

    fn visit_arm_mut(&mut self, node: &mut Arm) {
        self.enter();
        self.bind(&node.pat);
        self.visit_pat_mut(&mut node.pat);
        if let Some((_, guard)) = &mut node.guard {
            self.visit_expr_mut(guard);
        }
        self.visit_expr_mut(&mut node.body);
        self.leave();
    }

    fn visit_expr_for_loop_mut(&mut self, node: &mut ExprForLoop) {
        self.visit_expr_mut(&mut node.expr);
        self.enter();
        self.bind(&node.pat);
        self.visit_pat_mut(&mut node.pat);
        self.visit_block_mut(&mut node.body);
        self.leave();
    }

    fn visit_expr_if_mut(&mut self, node: &mut ExprIf) {
        self.visit_guarded(&mut node.cond, &mut node.then_branch);
        if let Some((_, else_branch)) = &mut node.else_branch {
            self.visit_expr_mut(else_branch);
        }
    }

    fn visit_expr_while_mut(&mut self, node: &mut ExprWhile) {
        self.visit_guarded(&mut node.cond, &mut node.body);
    }

    fn visit_macro_mut(&mut self, mac: &mut Macro) {
        mac.tokens = self.rewrite_tokens(mac.tokens.clone());
    }
}

/// Identifiers after `.` are fields or methods; after `::` they are only
/// ours when the path is anchored at `crate` or `self`.
fn renamable_at(trees: &[TokenTree], i: usize) -> bool {
    let punct = |j: usize, ch: char| matches!(trees.get(j), Some(TokenTree::Punct(p)) if p.as_char() == ch);
    if i >= 1 && punct(i - 1, '.') {
        return false;
    }
    if i >= 2 && punct(i - 1, ':') && punct(i - 2, ':') {
        return i >= 3
            && matches!(&trees[i - 3], TokenTree::Ident(anchor) if anchor == "crate" || anchor == "self");
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use quote::ToTokens;

    #[test]
    fn test_suffix_renames_items_and_paths() {
        let mut file: syn::File = syn::parse_str(
            "struct Config { n: u32 }
             fn build() -> Config { Config { n: helper() } }
             fn helper() -> u32 { crate::LIMIT }
             const LIMIT: u32 = 3;",
        )
        .unwrap();
        let renamed = apply_suffix(&mut file, "9");
        assert_eq!(renamed.len(), 4);
        assert_eq!(renamed["Config"], "Config_lt9");

        let text = file.to_token_stream().to_string();
        assert!(text.contains("fn build_lt9 () -> Config_lt9"));
        assert!(text.contains("Config_lt9 { n : helper_lt9 () }"));
        assert!(text.contains("crate :: LIMIT_lt9"));
    }

    #[test]
    fn test_macro_tokens_skip_fields_and_foreign_paths() {
        let mut file: syn::File = syn::parse_str(
            "fn len() -> usize { 1 }
             fn show(v: Vec<u8>) { println!(\"{}\", len() + v.len() + std::mem::size_of::<u8>()); }",
        )
        .unwrap();
        apply_suffix(&mut file, "1");
        let text = file.to_token_stream().to_string();
        assert!(text.contains("len_lt1 () + v . len ()"));
    }

    #[test]
    fn test_locals_shadowing_items_keep_their_name() {
        let mut file: syn::File = syn::parse_str(
            "fn count() -> usize { 3 }
             fn total(extra: usize) -> usize {
                 let count = count();
                 println!(\"{}\", count);
                 count + extra
             }
             fn scaled(count: usize) -> usize { count * 2 }",
        )
        .unwrap();
        apply_suffix(&mut file, "4");
        let text = file.to_token_stream().to_string();
        assert!(text.contains("let count = count_lt4 () ;"));
        assert!(text.contains("count + extra"));
        assert!(text.contains("println ! (\"{}\" , count)"));
        assert!(text.contains("count * 2"));
        assert!(!text.contains("count_lt4 + extra"));
    }

    #[test]
    fn test_binding_scopes_end_with_their_block() {
        let mut file: syn::File = syn::parse_str(
            "fn step() -> u8 { 1 }
             fn run(v: Vec<u8>) -> u8 {
                 for step in v.iter() { let _ = step; }
                 if let Some(step) = v.first() { let _ = step; }
                 match v.len() { step => { let _ = step; } }
                 let f = |step: u8| step;
                 f(step())
             }",
        )
        .unwrap();
        apply_suffix(&mut file, "2");
        let text = file.to_token_stream().to_string();
        // Every binding named `step` is left alone; the call after them all
        // still reaches the item.
        assert_eq!(text.matches("step_lt2").count(), 2);
        assert!(text.contains("f (step_lt2 ())"));
    }

    #[test]
    fn test_const_patterns_are_renamed() {
        let mut file: syn::File = syn::parse_str(
            "const LIMIT: u8 = 9;
             fn at_limit(n: u8) -> bool { match n { LIMIT => true, other => other > LIMIT } }",
        )
        .unwrap();
        apply_suffix(&mut file, "1");
        let text = file.to_token_stream().to_string();
        assert!(text.contains("LIMIT_lt1 => true"));
        assert!(text.contains("other > LIMIT_lt1"));
        assert!(text.contains("other =>"));
    }
}
