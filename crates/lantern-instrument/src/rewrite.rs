//! Whole-unit rewrite: locate the target, probe it, suffix the unit.

use std::collections::BTreeMap;

use lantern_ir::{FunctionIdentity, ProbeSite};
use quote::ToTokens;
use syn::{Block, ImplItem, Item, ReturnType, Signature, Type};

use crate::probe::{BodyProbes, ProbeAllocator};
use crate::rename::{apply_suffix, suffixed};
use crate::stand_in::route_calls;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InstrumentError {
    #[error("failed to parse {file}: {message}")]
    Parse { file: String, message: String },

    #[error("target '{target}' not found in {file}")]
    TargetNotFound { target: String, file: String },
}

/// `name` for a free function, `Type::name` for a method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetPath {
    pub owner: Option<String>,
    pub name: String,
}

impl TargetPath {
    pub fn parse(target: &str) -> Self {
        match target.rsplit_once("::") {
            Some((owner, name)) => Self {
                owner: Some(owner.rsplit("::").next().unwrap_or(owner).to_string()),
                name: name.to_string(),
            },
            None => Self {
                owner: None,
                name: target.to_string(),
            },
        }
    }

    pub fn identity(&self) -> FunctionIdentity {
        match &self.owner {
            Some(owner) => FunctionIdentity::method(owner.clone(), self.name.clone()),
            None => FunctionIdentity::new(self.name.clone()),
        }
    }

    /// How the target is named inside the rewritten unit.
    pub fn renamed(&self, renamed: &BTreeMap<String, String>) -> String {
        match &self.owner {
            Some(owner) => {
                let owner = renamed.get(owner).unwrap_or(owner);
                format!("{owner}::{}", self.name)
            }
            None => renamed
                .get(&self.name)
                .cloned()
                .unwrap_or_else(|| self.name.clone()),
        }
    }
}

/// Result of instrumenting one unit.
#[derive(Debug, Clone)]
pub struct Instrumented {
    pub source: String,
    /// All probe sites allocated by this rewrite.
    pub probe_count: u32,
    /// Recorder identity full name -> its probe sites.
    pub functions: BTreeMap<String, Vec<ProbeSite>>,
    /// Original top-level item name -> suffixed name.
    pub renamed: BTreeMap<String, String>,
    /// Target as it is called inside the rewritten unit.
    pub target: String,
    /// Structural nodes left unprobed.
    pub skipped: usize,
    /// Run id this rewrite's items were suffixed with.
    pub run_id: String,
    /// Mocked callee -> call sites routed through the stand-in queue.
    pub stand_in_sites: BTreeMap<String, usize>,
}

impl Instrumented {
    /// Suffixed form of a top-level item name for this rewrite.
    pub fn suffixed(&self, name: &str) -> String {
        suffixed(name, &self.run_id)
    }
}

/// Rewrites source units. Probe ids are unique per file name across every
/// rewrite performed by one instrumenter, and each rewrite gets its own run
/// id: the base id first, then `{base}_1`, `{base}_2` and so on.
#[derive(Debug)]
pub struct Instrumenter {
    base_run_id: String,
    rewrites: usize,
    allocator: ProbeAllocator,
}

impl Instrumenter {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            base_run_id: run_id.into(),
            rewrites: 0,
            allocator: ProbeAllocator::default(),
        }
    }

    fn next_run_id(&mut self) -> String {
        let run_id = match self.rewrites {
            0 => self.base_run_id.clone(),
            n => format!("{}_{n}", self.base_run_id),
        };
        self.rewrites += 1;
        run_id
    }

    pub fn instrument(
        &mut self,
        file_name: &str,
        source: &str,
        target: &str,
    ) -> Result<Instrumented, InstrumentError> {
        self.instrument_with_mocks(file_name, source, target, &[])
    }

    /// Like [`Instrumenter::instrument`], and routes every call to a
    /// `mocked` callee (`name` or `Owner::name`) inside the target through
    /// `lantern_runtime::mock`.
    pub fn instrument_with_mocks(
        &mut self,
        file_name: &str,
        source: &str,
        target: &str,
        mocked: &[String],
    ) -> Result<Instrumented, InstrumentError> {
        let mut file = syn::parse_file(source).map_err(|e| InstrumentError::Parse {
            file: file_name.to_string(),
            message: e.to_string(),
        })?;

        // The copy is compiled next to the original, whose tests already run.
        file.items.retain(|item| !is_test_module(item));

        let target_path = TargetPath::parse(target);
        let (sig, body) =
            find_target(&mut file, &target_path).ok_or_else(|| InstrumentError::TargetNotFound {
                target: target.to_string(),
                file: file_name.to_string(),
            })?;

        let cursor = self.allocator.cursor(file_name);
        let first = *cursor;
        let probes = BodyProbes::new(
            file_name,
            target_path.identity(),
            cursor,
            Some(result_arity(&sig.output)),
        );
        let (recorders, skipped) = probes.instrument_body(body);
        let probe_count = *self.allocator.cursor(file_name) - first;

        let stand_in_sites = route_calls(body, mocked);
        for (callee, sites) in &stand_in_sites {
            if *sites == 0 {
                log::warn!("mocked callee {callee} is never called by {target}");
            }
        }

        let functions = recorders
            .into_iter()
            .map(|r| (r.identity.full_name(), r.sites))
            .collect();

        let run_id = self.next_run_id();
        let renamed = apply_suffix(&mut file, &run_id);
        log::info!(
            "instrumented {target} in {file_name}: {probe_count} probes, {} items suffixed, {skipped} nodes skipped",
            renamed.len()
        );

        Ok(Instrumented {
            source: file.to_token_stream().to_string(),
            probe_count,
            functions,
            target: target_path.renamed(&renamed),
            renamed,
            skipped,
            run_id,
            stand_in_sites,
        })
    }
}

fn find_target<'f>(
    file: &'f mut syn::File,
    target: &TargetPath,
) -> Option<(&'f Signature, &'f mut Block)> {
    for item in file.items.iter_mut() {
        match item {
            Item::Fn(node) if target.owner.is_none() && node.sig.ident == target.name => {
                return Some((&node.sig, &mut *node.block));
            }
            Item::Impl(node)
                if target.owner.is_some() && self_type_name(&node.self_ty) == target.owner =>
            {
                for impl_item in node.items.iter_mut() {
                    if let ImplItem::Fn(method) = impl_item {
                        if method.sig.ident == target.name {
                            return Some((&method.sig, &mut method.block));
                        }
                    }
                }
            }
            _ => {}
        }
    }
    None
}

pub(crate) fn self_type_name(ty: &Type) -> Option<String> {
    match ty {
        Type::Path(path) => path.path.segments.last().map(|s| s.ident.to_string()),
        _ => None,
    }
}

pub(crate) fn result_arity(output: &ReturnType) -> usize {
    match output {
        ReturnType::Default => 0,
        ReturnType::Type(_, ty) => match ty.as_ref() {
            Type::Tuple(tuple) => tuple.elems.len(),
            _ => 1,
        },
    }
}

fn is_test_module(item: &Item) -> bool {
    let Item::Mod(module) = item else {
        return false;
    };
    module.attrs.iter().any(|attr| {
        attr.path().is_ident("cfg")
            && attr
                .parse_args::<syn::Ident>()
                .is_ok_and(|ident| ident == "test")
    })
}
