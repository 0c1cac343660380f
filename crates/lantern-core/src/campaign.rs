use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use lantern_instrument::{
    collect_types, extract_signature, InstrumentError, Instrumented, Instrumenter, Passing,
    TargetSignature,
};
use lantern_ir::wire::parse_output;
use lantern_ir::{SuiteHandoff, TypeDescriptor, TypeTable, WireRecord};
use lantern_synth::{
    candidate_rng, render, InjectorTable, NamespaceManager, SynthConfigError, SynthesisContext,
    Synthesizer, Value,
};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::LanternConfig;
use crate::retry::{retry_with_timeout, RetryError};
use crate::suite::{render_suite, CandidateText, SuiteSettings};
use crate::toolchain::{RunOutput, Toolchain, ToolchainError};

/// Local binding for the receiver of a method target.
const RECEIVER_VAR: &str = "recv";

#[derive(Debug, thiserror::Error)]
pub enum CampaignError {
    #[error("cannot generate tests for {target}: {reason}")]
    Unsupported { target: String, reason: String },

    #[error("invalid synthesis config: {0}")]
    Config(#[from] SynthConfigError),

    #[error("instrumentation error: {0}")]
    Instrument(#[from] InstrumentError),

    #[error("toolchain error: {0}")]
    Toolchain(#[from] ToolchainError),

    #[error("build and run failed: {0}")]
    Retry(#[from] RetryError<ToolchainError>),

    #[error("test run printed no coverage record: {stderr}")]
    MissingCoverage { stderr: String },

    #[error("run reported {reported} probes but instrumentation placed {expected}")]
    ProbeMismatch { reported: u32, expected: u32 },

    #[error("failed to read suite handoff {path}: {message}")]
    Handoff { path: PathBuf, message: String },
}

/// A callee to stand in for, with the types its stand-ins return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockSpec {
    pub callee: String,
    pub results: Vec<TypeDescriptor>,
}

/// One target function to generate tests for.
#[derive(Debug, Clone)]
pub struct TargetRequest {
    /// Unit file name as the toolchain knows it, e.g. `src/parser.rs`.
    pub file_name: String,
    /// Module path of the unit, e.g. `crate::parser`.
    pub module_path: String,
    pub source: String,
    /// `name` or `Type::name`.
    pub target: String,
    pub mocks: Vec<MockSpec>,
    pub injectors: InjectorTable,
}

impl TargetRequest {
    pub fn new(
        file_name: impl Into<String>,
        module_path: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            module_path: module_path.into(),
            source: source.into(),
            target: target.into(),
            mocks: Vec::new(),
            injectors: InjectorTable::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CampaignReport {
    pub target: String,
    /// Name of the generated unit handed to the toolchain.
    pub unit_name: String,
    pub probe_count: u32,
    pub candidates: usize,
    /// Parameters rendered as `Default::default()` placeholders.
    pub placeholders: Vec<String>,
    /// `(total, hit)` over every function that reported.
    pub coverage: (u32, u32),
    pub passed: u32,
    pub failed: u32,
    pub elapsed_secs: f64,
    pub panics: Vec<WireRecord>,
    pub handoff: Option<SuiteHandoff>,
}

/// Synthesized inputs for one candidate. `None` marks a placeholder.
#[derive(Debug, Clone)]
struct CandidateInputs {
    receiver: Option<Value>,
    args: Vec<Option<Value>>,
    mocks: Vec<(String, Vec<Vec<Value>>)>,
}

/// Drives targets through instrument, synthesize, build and select.
///
/// Every run of one campaign shares its instrumenter, so probe ids never
/// repeat within a file and each run's unit carries its own suffix.
pub struct Campaign {
    config: LanternConfig,
    toolchain: Arc<dyn Toolchain>,
    instrumenter: Mutex<Instrumenter>,
}

impl Campaign {
    pub fn new(config: LanternConfig, toolchain: Arc<dyn Toolchain>) -> Self {
        let instrumenter = Mutex::new(Instrumenter::new(config.run_id.clone()));
        Self {
            config,
            toolchain,
            instrumenter,
        }
    }

    pub fn config(&self) -> &LanternConfig {
        &self.config
    }

    pub async fn run(&self, request: TargetRequest) -> Result<CampaignReport, CampaignError> {
        self.config.synth.validate()?;
        let mocked: Vec<String> = request.mocks.iter().map(|m| m.callee.clone()).collect();
        let instrumented = self
            .instrumenter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .instrument_with_mocks(&request.file_name, &request.source, &request.target, &mocked)?;
        let signature = extract_signature(&instrumented.source, &instrumented.target)?;
        if signature.is_async {
            return Err(CampaignError::Unsupported {
                target: request.target.clone(),
                reason: "async functions are not supported".to_string(),
            });
        }
        let table = collect_types(&instrumented.source, &request.module_path)?;
        log::info!(
            "campaign for {}: {} probes, {} params, {} known types",
            request.target,
            instrumented.probe_count,
            signature.params.len(),
            table.len()
        );

        let injectors = request.injectors.renamed(&instrumented.renamed);
        let (inputs, placeholders) = self.generate(&signature, &table, &injectors, &request.mocks);
        let mut ns = NamespaceManager::new(request.module_path.clone());
        for name in instrumented.renamed.values() {
            ns.reserve(name);
        }
        let original_names: BTreeMap<String, String> = instrumented
            .renamed
            .iter()
            .map(|(original, suffixed)| (suffixed.clone(), original.clone()))
            .collect();
        let texts: Vec<CandidateText> = inputs
            .iter()
            .enumerate()
            .map(|(index, candidate)| {
                candidate_text(index, candidate, &signature, &instrumented, &original_names, &mut ns)
            })
            .collect();

        let settings = SuiteSettings {
            collect_window_ms: self.config.collect_window_ms,
            max_suite_size: self.config.max_suite_size,
            handoff_path: self.config.handoff_path.clone(),
        };
        let unit_source = render_suite(
            &instrumented.source,
            &ns.use_declarations(),
            &settings,
            &texts,
        );
        let unit_name = unit_file_name(&request.file_name, &instrumented);
        self.toolchain.write_unit(&unit_name, &unit_source)?;
        log::info!("wrote {} candidates to {unit_name}", texts.len());

        let output = self.build_and_run(&unit_name).await?;
        let records = parse_output(&output.stdout);
        let coverage = records
            .iter()
            .find_map(|record| match record {
                WireRecord::Coverage { total, hit } => Some((*total, *hit)),
                _ => None,
            })
            .ok_or_else(|| CampaignError::MissingCoverage {
                stderr: output.stderr.clone(),
            })?;

        let handoff = self.read_handoff().await?;
        verify_probes(coverage.0, &instrumented, handoff.as_ref())?;

        let (passed, failed, elapsed_secs) = records
            .iter()
            .find_map(|record| match record {
                WireRecord::CoverResult {
                    passed,
                    failed,
                    elapsed_secs,
                } => Some((*passed, *failed, *elapsed_secs)),
                _ => None,
            })
            .unwrap_or_default();
        let panics: Vec<WireRecord> = records
            .into_iter()
            .filter(|record| matches!(record, WireRecord::Panic { .. }))
            .collect();
        log::info!(
            "{}: {}/{} probes hit, {passed} passed, {failed} failed",
            request.target,
            coverage.1,
            coverage.0
        );

        Ok(CampaignReport {
            target: request.target,
            unit_name,
            probe_count: instrumented.probe_count,
            candidates: texts.len(),
            placeholders,
            coverage,
            passed,
            failed,
            elapsed_secs,
            panics,
            handoff,
        })
    }

    /// Synthesize candidate 0, then mutate a random earlier candidate for
    /// each of the rest.
    fn generate(
        &self,
        signature: &TargetSignature,
        table: &TypeTable,
        injectors: &InjectorTable,
        mocks: &[MockSpec],
    ) -> (Vec<CandidateInputs>, Vec<String>) {
        let ctx = SynthesisContext::new(injectors);
        let receiver_ty = signature
            .receiver
            .and(signature.owner.as_ref())
            .map(|owner| TypeDescriptor::named(owner.clone()));
        let mut placeholders = Vec::new();
        let mut inputs: Vec<CandidateInputs> = Vec::with_capacity(self.config.candidates);

        for index in 0..self.config.candidates {
            let rng = candidate_rng(self.config.seed, index as u64);
            let mut synth = Synthesizer::new(table, self.config.synth.clone(), rng);
            let parent = match index {
                0 => None,
                _ => Some(synth.rng().gen_range(0..index)),
            };

            let receiver = receiver_ty.as_ref().and_then(|ty| {
                let previous = parent.and_then(|p| inputs[p].receiver.as_ref());
                let result = match previous {
                    Some(value) => synth.mutate(ctx.with_nil(false), ty, value),
                    None => synth.synthesize(ctx.with_nil(false), ty),
                };
                result
                    .map_err(|err| {
                        if index == 0 {
                            log::warn!("receiver of {} left to Default: {err}", signature.name);
                            placeholders.push(RECEIVER_VAR.to_string());
                        }
                    })
                    .ok()
            });

            let mut args = Vec::with_capacity(signature.params.len());
            for (slot, param) in signature.params.iter().enumerate() {
                let result = match parent {
                    None => synth.synthesize(ctx, &param.ty),
                    Some(p) => match &inputs[p].args[slot] {
                        Some(value) => synth.mutate(ctx, &param.ty, value),
                        None => {
                            args.push(None);
                            continue;
                        }
                    },
                };
                match result {
                    Ok(value) => args.push(Some(value)),
                    Err(err) => {
                        if index == 0 {
                            log::warn!(
                                "parameter {} of {} left to Default: {err}",
                                param.name,
                                signature.name
                            );
                            placeholders.push(param.name.clone());
                        }
                        args.push(None);
                    }
                }
            }

            let stand_ins = mocks
                .iter()
                .map(|mock| (mock.callee.clone(), Self::stand_ins(&mut synth, ctx, mock)))
                .collect();

            inputs.push(CandidateInputs {
                receiver,
                args,
                mocks: stand_ins,
            });
        }
        (inputs, placeholders)
    }

    fn stand_ins(
        synth: &mut Synthesizer<'_>,
        ctx: SynthesisContext<'_>,
        mock: &MockSpec,
    ) -> Vec<Vec<Value>> {
        let most = synth.config().max_mock_returns.max(1);
        let count = synth.rng().gen_range(1..=most);
        (0..count)
            .map(|_| {
                mock.results
                    .iter()
                    .map(|ty| match synth.synthesize(ctx, ty) {
                        Ok(value) => value,
                        Err(_) => synth.zero_value(ty),
                    })
                    .collect()
            })
            .collect()
    }

    async fn build_and_run(&self, unit_name: &str) -> Result<RunOutput, CampaignError> {
        let retry = &self.config.retry;
        let output = retry_with_timeout(
            "build_and_run",
            retry.budget,
            retry.timeout(),
            |attempt| {
                let toolchain = Arc::clone(&self.toolchain);
                let unit = unit_name.to_string();
                async move {
                    log::debug!("building {unit}, attempt {attempt}");
                    tokio::task::spawn_blocking(move || toolchain.build_and_run(&unit))
                        .await
                        .unwrap_or_else(|err| {
                            Err(ToolchainError::Run {
                                message: err.to_string(),
                            })
                        })
                }
            },
            ToolchainError::is_fatal,
        )
        .await?;
        Ok(output)
    }

    async fn read_handoff(&self) -> Result<Option<SuiteHandoff>, CampaignError> {
        let Some(path) = &self.config.handoff_path else {
            return Ok(None);
        };
        let failed = |message: String| CampaignError::Handoff {
            path: path.clone(),
            message,
        };
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| failed(e.to_string()))?;
        SuiteHandoff::from_json(&json)
            .map(Some)
            .map_err(|e| failed(e.to_string()))
    }
}

fn candidate_text(
    index: usize,
    inputs: &CandidateInputs,
    signature: &TargetSignature,
    instrumented: &Instrumented,
    original_names: &BTreeMap<String, String>,
    ns: &mut NamespaceManager,
) -> CandidateText {
    let mut lines = Vec::new();
    for (callee, stand_ins) in &inputs.mocks {
        for results in stand_ins {
            let mut rendered: Vec<String> = results.iter().map(|v| render(v, ns)).collect();
            let value = match rendered.len() {
                1 => rendered.remove(0),
                _ => format!("({})", rendered.join(", ")),
            };
            lines.push(format!("::lantern_runtime::mock::push({callee:?}, {value});"));
        }
    }

    let args: Vec<String> = signature
        .params
        .iter()
        .zip(&inputs.args)
        .map(|(param, value)| {
            let text = value
                .as_ref()
                .map(|v| render(v, ns))
                .unwrap_or_else(|| "Default::default()".to_string());
            format!("{}{text}", param.passing.prefix())
        })
        .collect();
    let args = args.join(", ");

    let call = match (signature.receiver, &signature.owner) {
        (Some(passing), Some(owner)) => {
            let value = inputs
                .receiver
                .as_ref()
                .map(|v| render(v, ns))
                .unwrap_or_else(|| "Default::default()".to_string());
            let binding = match passing {
                Passing::RefMut => "let mut",
                _ => "let",
            };
            lines.push(format!("{binding} {RECEIVER_VAR}: {owner} = {value};"));
            format!("{RECEIVER_VAR}.{}({args})", signature.name)
        }
        _ => format!("{}({args})", instrumented.target),
    };
    lines.push(format!("let _ = {call};"));

    let body = lines.join("\n");
    CandidateText {
        index,
        fragment: restore_names(&body, original_names),
        body,
        mock_calls: inputs
            .mocks
            .iter()
            .map(|(callee, stand_ins)| (callee.clone(), stand_ins.len()))
            .collect(),
    }
}

/// `src/parser.rs` -> `src/parser_lt<run>.rs`.
fn unit_file_name(file_name: &str, instrumented: &Instrumented) -> String {
    match file_name.strip_suffix(".rs") {
        Some(stem) => format!("{}.rs", instrumented.suffixed(stem)),
        None => instrumented.suffixed(file_name),
    }
}

/// Swap whole identifiers found in `names`. String and char literals and
/// lifetimes are copied untouched.
fn restore_names(text: &str, names: &BTreeMap<String, String>) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let end = match c {
            '"' => literal_end(&chars, i, '"'),
            '\'' => {
                let is_char = chars.get(i + 1) == Some(&'\\') || chars.get(i + 2) == Some(&'\'');
                if is_char {
                    literal_end(&chars, i, '\'')
                } else {
                    word_end(&chars, i + 1)
                }
            }
            c if c.is_ascii_digit() => word_end(&chars, i),
            c if c == '_' || c.is_alphabetic() => {
                let end = word_end(&chars, i);
                let word: String = chars[i..end].iter().collect();
                out.push_str(names.get(&word).map_or(word.as_str(), String::as_str));
                i = end;
                continue;
            }
            _ => i + 1,
        };
        out.extend(&chars[i..end]);
        i = end;
    }
    out
}

fn word_end(chars: &[char], start: usize) -> usize {
    chars[start..]
        .iter()
        .position(|c| !(*c == '_' || c.is_alphanumeric()))
        .map_or(chars.len(), |offset| start + offset)
}

fn literal_end(chars: &[char], start: usize, quote: char) -> usize {
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            c if c == quote => return i + 1,
            _ => i += 1,
        }
    }
    chars.len()
}

/// The reported total must match the probes placed in every function that
/// reported. Without a handoff only the upper bound can be checked.
fn verify_probes(
    reported: u32,
    instrumented: &Instrumented,
    handoff: Option<&SuiteHandoff>,
) -> Result<(), CampaignError> {
    let Some(handoff) = handoff else {
        if reported > instrumented.probe_count {
            return Err(CampaignError::ProbeMismatch {
                reported,
                expected: instrumented.probe_count,
            });
        }
        return Ok(());
    };
    let expected: u32 = handoff
        .functions
        .keys()
        .filter_map(|name| instrumented.functions.get(name))
        .map(|sites| sites.len() as u32)
        .sum();
    if reported != expected {
        return Err(CampaignError::ProbeMismatch { reported, expected });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restore_names_swaps_whole_identifiers_only() {
        let names = BTreeMap::from([
            ("parse_lt1".to_string(), "parse".to_string()),
            ("Limit_lt1".to_string(), "Limit".to_string()),
        ]);
        let body = r#"let _ = parse_lt1(Limit_lt1 { n: 1 }, Limit_lt12 { n: 2 }, "parse_lt1", 'p');"#;
        assert_eq!(
            restore_names(body, &names),
            r#"let _ = parse(Limit { n: 1 }, Limit_lt12 { n: 2 }, "parse_lt1", 'p');"#
        );
    }

    #[test]
    fn test_restore_names_skips_escapes_and_lifetimes() {
        let names = BTreeMap::from([("a_lt1".to_string(), "a".to_string())]);
        let body = r#"let s: &'a_lt1 str = "q\"a_lt1"; let c = '\''; a_lt1(s, c, 12u8);"#;
        assert_eq!(
            restore_names(body, &names),
            r#"let s: &'a_lt1 str = "q\"a_lt1"; let c = '\''; a(s, c, 12u8);"#
        );
    }
}
