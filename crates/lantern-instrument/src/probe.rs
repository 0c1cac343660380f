//! Probe insertion inside one function body.

use std::collections::BTreeMap;
use std::mem;

use lantern_ir::{FunctionIdentity, ProbeSite};
use proc_macro2::{Ident, Literal, Span, TokenStream};
use quote::quote;
use syn::visit::{self, Visit};
use syn::visit_mut::{self, VisitMut};
use syn::{
    parse_quote, Block, Expr, ExprBlock, ExprClosure, ExprIf, ExprMatch, ExprReturn, Item, Local,
    LocalInit, Macro, Pat, Stmt,
};

use crate::{CANDIDATE_IDENT, RECORDER_IDENT};

/// Calls whose last path segment (or method name) marks a background task.
const SPAWN_NAMES: &[&str] = &["spawn", "spawn_blocking", "spawn_local"];

/// Per-file probe id counters. Ids are never reused across rewrites of
/// the same file.
#[derive(Debug, Default)]
pub(crate) struct ProbeAllocator {
    next: BTreeMap<String, ProbeSite>,
}

impl ProbeAllocator {
    pub(crate) fn cursor(&mut self, file: &str) -> &mut ProbeSite {
        self.next.entry(file.to_string()).or_insert(0)
    }
}

/// Probes allocated for one recorder identity.
#[derive(Debug, Clone)]
pub(crate) struct RecorderSites {
    pub(crate) identity: FunctionIdentity,
    pub(crate) sites: Vec<ProbeSite>,
}

/// Rewrites one body: statement probes in branch bodies, exit probes on
/// `return`, own recorders for spawned tasks.
///
/// Probes reference the body's recorder local, so they are only placed
/// where the code cannot outlive the body's frame: branch bodies, and
/// closures bound to a local that is only ever called in place. Spawned
/// closures and async blocks get a recorder of their own; any other
/// closure or async block is left unprobed.
pub(crate) struct BodyProbes<'a> {
    file: &'a str,
    identity: FunctionIdentity,
    next: &'a mut ProbeSite,
    sites: Vec<ProbeSite>,
    /// Declared result arity of the enclosing function; `None` inside
    /// closures and async blocks.
    result_arity: Option<usize>,
    /// Index the next spawned task takes, shared by nested task bodies.
    next_task: u32,
    tasks: Vec<RecorderSites>,
    pub(crate) skipped: usize,
}

impl<'a> BodyProbes<'a> {
    pub(crate) fn new(
        file: &'a str,
        identity: FunctionIdentity,
        next: &'a mut ProbeSite,
        result_arity: Option<usize>,
    ) -> Self {
        Self {
            file,
            identity,
            next,
            sites: Vec::new(),
            result_arity,
            next_task: 0,
            tasks: Vec::new(),
            skipped: 0,
        }
    }

    /// Instrument a function body and prepend its entry recorder.
    ///
    /// Returns the sites of the body's own recorder followed by those of any
    /// background tasks spawned inside it.
    pub(crate) fn instrument_body(mut self, body: &mut Block) -> (Vec<RecorderSites>, usize) {
        self.visit_stmts(&mut body.stmts);
        let total = self.sites.len() as u32;
        body.stmts
            .insert(0, entry_stmt(&self.identity, self.file, total, None));

        let mut recorders = vec![RecorderSites {
            identity: self.identity,
            sites: self.sites,
        }];
        recorders.extend(self.tasks);
        (recorders, self.skipped)
    }

    fn allocate(&mut self) -> ProbeSite {
        let id = *self.next;
        *self.next += 1;
        self.sites.push(id);
        id
    }

    /// Insert a probe before each statement of a branch body.
    fn probe_block(&mut self, block: &mut Block) {
        if block.stmts.is_empty() {
            log::debug!("{}: empty block left unprobed", self.identity);
            self.skipped += 1;
            return;
        }

        let mut stmts = mem::take(&mut block.stmts);
        let ids: Vec<Option<ProbeSite>> = stmts
            .iter()
            .map(|stmt| (!matches!(stmt, Stmt::Item(_))).then(|| self.allocate()))
            .collect();
        self.visit_stmts(&mut stmts);

        let mut out = Vec::with_capacity(stmts.len() * 2);
        for (stmt, id) in stmts.into_iter().zip(ids) {
            if let Some(id) = id {
                out.push(hit_stmt(id));
            }
            out.push(stmt);
        }
        block.stmts = out;
    }

    /// Visit a statement list, probing closures bound to locals that never
    /// escape the list.
    fn visit_stmts(&mut self, stmts: &mut [Stmt]) {
        for i in 0..stmts.len() {
            let (head, rest) = stmts.split_at_mut(i + 1);
            let stmt = &mut head[i];
            let confined = local_closure(stmt).is_some_and(|name| only_called(&name, rest));
            if confined {
                if let Some(closure) = closure_init(stmt) {
                    self.probe_closure(closure);
                    continue;
                }
            }
            self.visit_stmt_mut(stmt);
        }
    }

    /// Probe an expression that is not a block by wrapping it as
    /// `{ hit; expr }`.
    fn probe_expr(&mut self, expr: &mut Expr) {
        let id = self.allocate();
        self.visit_expr_mut(expr);
        let inner = mem::replace(expr, Expr::Verbatim(TokenStream::new()));
        *expr = block_expr(vec![hit_stmt(id), Stmt::Expr(inner, None)]);
    }

    fn probe_if(&mut self, node: &mut ExprIf) {
        self.visit_expr_mut(&mut node.cond);
        self.probe_block(&mut node.then_branch);

        let Some((_, else_branch)) = &mut node.else_branch else {
            return;
        };
        // `else if` has no block of its own; give it one so the nested
        // condition gets a probe.
        if matches!(else_branch.as_ref(), Expr::If(_)) {
            let nested = mem::replace(else_branch.as_mut(), Expr::Verbatim(TokenStream::new()));
            **else_branch = block_expr(vec![Stmt::Expr(nested, None)]);
        }
        match else_branch.as_mut() {
            Expr::Block(block) => self.probe_block(&mut block.block),
            other => self.visit_expr_mut(other),
        }
    }

    fn probe_match(&mut self, node: &mut ExprMatch) {
        self.visit_expr_mut(&mut node.expr);
        if node.arms.is_empty() {
            log::warn!("{}: match without arms left unprobed", self.identity);
            self.skipped += 1;
            return;
        }
        for arm in node.arms.iter_mut() {
            if let Some((_, guard)) = &mut arm.guard {
                self.visit_expr_mut(guard);
            }
            match arm.body.as_mut() {
                Expr::Block(block) if block.label.is_none() && block.attrs.is_empty() => {
                    self.probe_block(&mut block.block)
                }
                body => self.probe_expr(body),
            }
        }
    }

    fn probe_closure(&mut self, node: &mut ExprClosure) {
        let saved = self.result_arity.take();
        match node.body.as_mut() {
            Expr::Block(block) if block.label.is_none() => self.probe_block(&mut block.block),
            body => self.probe_expr(body),
        }
        self.result_arity = saved;
    }

    fn probe_return(&mut self, node: &mut ExprReturn) {
        if let Some(expr) = &mut node.expr {
            self.visit_expr_mut(expr);
        }
        if let Some(arity) = self.result_arity.filter(|n| *n >= 2) {
            let matches_arity = matches!(
                node.expr.as_deref(),
                Some(Expr::Tuple(tuple)) if tuple.elems.len() == arity
            );
            if !matches_arity {
                log::warn!(
                    "{}: return does not spell out its {arity} results, left unprobed",
                    self.identity
                );
                self.skipped += 1;
                return;
            }
        }

        let id = self.allocate();
        let mut stmts = vec![hit_stmt(id)];
        if let Some(inner) = node.expr.take() {
            stmts.push(Stmt::Expr(*inner, None));
        }
        node.expr = Some(Box::new(block_expr(stmts)));
    }

    fn probe_spawn_args<'e>(&mut self, args: impl Iterator<Item = &'e mut Expr>) {
        for arg in args {
            if matches!(arg, Expr::Closure(_) | Expr::Async(_)) {
                self.instrument_task(arg);
            } else {
                self.visit_expr_mut(arg);
            }
        }
    }

    /// Give a spawned closure or async block its own recorder under the
    /// next task identity. The spawning candidate is captured before the
    /// spawn and moved into the body.
    fn instrument_task(&mut self, arg: &mut Expr) {
        let index = self.next_task;
        self.next_task += 1;
        let identity = self.identity.as_task(index);
        let file = self.file;
        let mut task = BodyProbes::new(file, identity.clone(), &mut *self.next, None);
        task.next_task = self.next_task;

        let body = match arg {
            Expr::Closure(closure) => {
                if !matches!(closure.body.as_ref(), Expr::Block(_)) {
                    let inner =
                        mem::replace(closure.body.as_mut(), Expr::Verbatim(TokenStream::new()));
                    *closure.body = block_expr(vec![Stmt::Expr(inner, None)]);
                }
                match closure.body.as_mut() {
                    Expr::Block(block) => &mut block.block,
                    _ => return,
                }
            }
            Expr::Async(block) => &mut block.block,
            _ => return,
        };

        task.visit_stmts(&mut body.stmts);
        let BodyProbes {
            sites,
            next_task,
            tasks,
            skipped,
            ..
        } = task;
        body.stmts
            .insert(0, entry_stmt(&identity, file, sites.len() as u32, Some(index)));

        self.next_task = next_task;
        self.skipped += skipped;
        self.tasks.push(RecorderSites { identity, sites });
        self.tasks.extend(tasks);

        let candidate = Ident::new(CANDIDATE_IDENT, Span::call_site());
        let inner = mem::replace(arg, Expr::Verbatim(TokenStream::new()));
        *arg = parse_quote! {
            {
                let #candidate = ::lantern_runtime::TaskOrigin::capture();
                #inner
            }
        };
    }
}

impl VisitMut for BodyProbes<'_> {
    fn visit_expr_mut(&mut self, expr: &mut Expr) {
        match expr {
            Expr::If(node) => self.probe_if(node),
            Expr::Match(node) => self.probe_match(node),
            Expr::While(node) => {
                self.visit_expr_mut(&mut node.cond);
                self.probe_block(&mut node.body);
            }
            Expr::ForLoop(node) => {
                self.visit_expr_mut(&mut node.expr);
                self.probe_block(&mut node.body);
            }
            Expr::Loop(node) => self.probe_block(&mut node.body),
            Expr::Closure(_) => {
                log::warn!(
                    "{}: closure that may outlive the call left unprobed",
                    self.identity
                );
                self.skipped += 1;
            }
            Expr::Async(_) => {
                log::warn!("{}: async block outside a spawn call left unprobed", self.identity);
                self.skipped += 1;
            }
            Expr::Call(node) if is_spawn_callee(&node.func) => {
                self.visit_expr_mut(&mut node.func);
                self.probe_spawn_args(node.args.iter_mut());
            }
            Expr::MethodCall(node) if is_spawn_name(&node.method) => {
                self.visit_expr_mut(&mut node.receiver);
                self.probe_spawn_args(node.args.iter_mut());
            }
            Expr::Return(node) => self.probe_return(node),
            Expr::Macro(_) => {}
            _ => visit_mut::visit_expr_mut(self, expr),
        }
    }

    fn visit_local_init_mut(&mut self, init: &mut LocalInit) {
        self.visit_expr_mut(&mut init.expr);
        if let Some((_, diverge)) = &mut init.diverge {
            match diverge.as_mut() {
                Expr::Block(block) => self.probe_block(&mut block.block),
                other => self.visit_expr_mut(other),
            }
        }
    }

    // Macro bodies are opaque token streams.
    fn visit_macro_mut(&mut self, _mac: &mut Macro) {}

    // Nested items are separate functions.
    fn visit_item_mut(&mut self, _item: &mut Item) {}
}

fn is_spawn_name(ident: &Ident) -> bool {
    SPAWN_NAMES.iter().any(|name| ident == name)
}

fn is_spawn_callee(func: &Expr) -> bool {
    match func {
        Expr::Path(path) => path
            .path
            .segments
            .last()
            .is_some_and(|segment| is_spawn_name(&segment.ident)),
        _ => false,
    }
}

fn hit_stmt(id: ProbeSite) -> Stmt {
    let recorder = Ident::new(RECORDER_IDENT, Span::call_site());
    let id = Literal::u32_suffixed(id);
    Stmt::Expr(parse_quote!(#recorder.hit(#id)), Some(Default::default()))
}

fn block_expr(stmts: Vec<Stmt>) -> Expr {
    Expr::Block(ExprBlock {
        attrs: Vec::new(),
        label: None,
        block: Block {
            brace_token: Default::default(),
            stmts,
        },
    })
}

fn entry_stmt(identity: &FunctionIdentity, file: &str, total: u32, task: Option<u32>) -> Stmt {
    let recorder = Ident::new(RECORDER_IDENT, Span::call_site());
    let name = identity.name.as_str();
    let receiver = match &identity.receiver {
        Some(receiver) => quote!(::core::option::Option::Some(#receiver)),
        None => quote!(::core::option::Option::None),
    };
    let total = Literal::u32_suffixed(total);
    match task {
        Some(index) => {
            let candidate = Ident::new(CANDIDATE_IDENT, Span::call_site());
            let index = Literal::u32_suffixed(index);
            parse_quote! {
                let #recorder = ::lantern_runtime::PathRecorder::enter_task(
                    #name, #receiver, #index, #file, #total, #candidate
                );
            }
        }
        None => parse_quote! {
            let #recorder = ::lantern_runtime::PathRecorder::enter(#name, #receiver, #file, #total);
        },
    }
}

/// Name bound by `let name = |..| ..;` when the closure neither moves nor
/// is async.
fn local_closure(stmt: &Stmt) -> Option<Ident> {
    let Stmt::Local(Local {
        pat,
        init: Some(LocalInit {
            expr,
            diverge: None,
            ..
        }),
        ..
    }) = stmt
    else {
        return None;
    };
    let plain = matches!(
        expr.as_ref(),
        Expr::Closure(closure) if closure.capture.is_none() && closure.asyncness.is_none()
    );
    if !plain {
        return None;
    }
    let pat = match pat {
        Pat::Type(typed) => typed.pat.as_ref(),
        other => other,
    };
    match pat {
        Pat::Ident(binding) if binding.subpat.is_none() => Some(binding.ident.clone()),
        _ => None,
    }
}

fn closure_init(stmt: &mut Stmt) -> Option<&mut ExprClosure> {
    match stmt {
        Stmt::Local(Local {
            init: Some(init), ..
        }) => match init.expr.as_mut() {
            Expr::Closure(closure) => Some(closure),
            _ => None,
        },
        _ => None,
    }
}

/// Whether every later mention of `name` is a direct call outside any
/// closure, async block or macro.
fn only_called(name: &Ident, rest: &[Stmt]) -> bool {
    let mut uses = LocalUses {
        name,
        nested: 0,
        escapes: false,
    };
    for stmt in rest {
        uses.visit_stmt(stmt);
    }
    !uses.escapes
}

struct LocalUses<'n> {
    name: &'n Ident,
    nested: usize,
    escapes: bool,
}

impl LocalUses<'_> {
    fn names(&self, expr: &Expr) -> bool {
        matches!(expr, Expr::Path(path) if path.qself.is_none() && path.path.is_ident(self.name))
    }
}

impl<'ast> Visit<'ast> for LocalUses<'_> {
    fn visit_expr(&mut self, expr: &'ast Expr) {
        match expr {
            Expr::Call(call) if self.names(&call.func) => {
                if self.nested > 0 {
                    self.escapes = true;
                }
                for arg in &call.args {
                    self.visit_expr(arg);
                }
            }
            Expr::Closure(_) | Expr::Async(_) => {
                self.nested += 1;
                visit::visit_expr(self, expr);
                self.nested -= 1;
            }
            _ if self.names(expr) => self.escapes = true,
            _ => visit::visit_expr(self, expr),
        }
    }

    fn visit_macro(&mut self, mac: &'ast Macro) {
        if mentions(mac.tokens.clone(), self.name) {
            self.escapes = true;
        }
    }

    fn visit_item(&mut self, _item: &'ast Item) {}
}

fn mentions(tokens: TokenStream, name: &Ident) -> bool {
    tokens.into_iter().any(|tree| match tree {
        proc_macro2::TokenTree::Ident(ident) => ident == *name,
        proc_macro2::TokenTree::Group(group) => mentions(group.stream(), name),
        _ => false,
    })
}
