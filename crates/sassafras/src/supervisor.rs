//! The compiler supervisor and protocol driver.
//!
//! A [`Supervisor`] owns one external compiler process and drives exactly
//! one compilation at a time over it. While a compilation is in flight
//! the compiler may call back into the host to canonicalize and load
//! imports or to invoke host functions; the driver answers those on the
//! caller's own thread, in strict arrival order, echoing each request's
//! id.
//!
//! # States
//!
//! ```text
//! Idle --compile--> Active
//! Active --CompileResponse--> Idle
//! Active --callback request--> ActiveInCallback --reply sent--> Active
//! Active|ActiveInCallback --error, restart ok--> Idle
//! Active|ActiveInCallback --error, restart fail--> Broken
//! Idle|Broken --reinit--> Idle (or Broken on spawn failure)
//! ```
//!
//! A failed compilation ([`CompilerError`](crate::error::CompilerError))
//! is a normal outcome and leaves the supervisor Idle. Everything else
//! that escapes the receive loop corrupts the channel: the child is
//! killed and respawned, and the supervisor goes Broken only if the
//! respawn itself fails.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, warn};
use url::Url;

use sassafras_protocol::{self as proto, InboundMessage, OutboundMessage, OutputStyle, Syntax};

use crate::channel::Channel;
use crate::codec;
use crate::diagnostics::Diagnostic;
use crate::error::{Error, LifecycleError, ProtocolError, Result};
use crate::importer::{HostFunction, ImportResolver, Importer};
use crate::registry;
use crate::value::HostCallback;

/// Compilation ids are allocated by incrementing past this base, so the
/// first compilation of a supervisor is 1001.
const COMPILATION_ID_BASE: u32 = 1000;

/// Importer slot `n` of a compilation is addressed as `4000 + n`.
const IMPORTER_ID_BASE: u32 = 4000;

/// Every receive gets at least this much budget, even with the overall
/// deadline already behind us.
const MIN_RECEIVE_TIMEOUT: Duration = Duration::from_secs(1);

/// Where a supervisor is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// Ready to accept a compilation.
    Idle,
    /// A compilation is in flight.
    Active,
    /// A compilation is in flight and a host callback is running.
    ActiveInCallback,
    /// Restarting the compiler failed; this supervisor is done for.
    Broken,
}

/// Per-call compilation options.
#[derive(Clone, Default)]
pub struct CompileOptions {
    pub style: OutputStyle,
    pub source_map: bool,
    /// Appended after the supervisor's global importers.
    pub importers: Vec<ImportResolver>,
    /// Override the supervisor's global functions by name.
    pub functions: Vec<HostFunction>,
}

/// A successful compilation.
#[derive(Debug)]
pub struct CompileOutput {
    pub css: String,
    pub source_map: Option<String>,
    /// Warnings, deprecation warnings and `@debug` output, in arrival
    /// order.
    pub diagnostics: Vec<Diagnostic>,
}

type DebugSink = Box<dyn FnMut(&Diagnostic) + Send>;

/// Host-side owner of one external Sass compiler process.
pub struct Supervisor {
    exec_path: Utf8PathBuf,
    timeout: Option<Duration>,
    state: SupervisorState,
    channel: Channel,
    next_compilation_id: u32,
    importers: Vec<ImportResolver>,
    functions: Vec<HostFunction>,
    debug_sink: Option<DebugSink>,
}

impl Supervisor {
    /// Spawn the compiler at `exec_path` and wrap it in an idle
    /// supervisor.
    ///
    /// `timeout_seconds` budgets a whole compilation; zero or negative
    /// disables the deadline. `importers` and `functions` apply to every
    /// compilation, before per-call additions.
    pub fn new(
        exec_path: impl Into<Utf8PathBuf>,
        timeout_seconds: i64,
        importers: Vec<ImportResolver>,
        functions: Vec<HostFunction>,
    ) -> Result<Self> {
        let exec_path = exec_path.into();
        let channel = Channel::spawn(&exec_path, &[], None)?;
        Ok(Self {
            exec_path,
            timeout: timeout_from_seconds(timeout_seconds),
            state: SupervisorState::Idle,
            channel,
            next_compilation_id: COMPILATION_ID_BASE,
            importers,
            functions,
            debug_sink: None,
        })
    }

    /// Like [`new`](Supervisor::new), but resolves a bare executable name
    /// against `PATH`.
    pub fn new_from_name(
        name: &str,
        timeout_seconds: i64,
        importers: Vec<ImportResolver>,
        functions: Vec<HostFunction>,
    ) -> Result<Self> {
        let exec_path = resolve_executable(name)?;
        Self::new(exec_path, timeout_seconds, importers, functions)
    }

    #[cfg(test)]
    pub(crate) fn with_channel(
        channel: Channel,
        exec_path: impl Into<Utf8PathBuf>,
        timeout_seconds: i64,
        importers: Vec<ImportResolver>,
        functions: Vec<HostFunction>,
    ) -> Self {
        Self {
            exec_path: exec_path.into(),
            timeout: timeout_from_seconds(timeout_seconds),
            state: SupervisorState::Idle,
            channel,
            next_compilation_id: COMPILATION_ID_BASE,
            importers,
            functions,
            debug_sink: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn force_state(&mut self, state: SupervisorState) {
        self.state = state;
    }

    /// Pid of the compiler process.
    pub fn process_id(&self) -> u32 {
        self.channel.process_id()
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Observe each diagnostic as it arrives, before `compile` returns.
    pub fn set_debug_sink<F>(&mut self, sink: F)
    where
        F: FnMut(&Diagnostic) + Send + 'static,
    {
        self.debug_sink = Some(Box::new(sink));
    }

    /// Replace the compiler process. Allowed from Idle (fresh start) and
    /// from Broken (recovery attempt); a failed respawn leaves the
    /// supervisor Broken.
    pub fn reinit(&mut self) -> Result<()> {
        match self.state {
            SupervisorState::Idle | SupervisorState::Broken => {}
            SupervisorState::Active | SupervisorState::ActiveInCallback => {
                return Err(LifecycleError::CompileInProgress.into());
            }
        }
        self.channel.terminate();
        match Channel::spawn(&self.exec_path, &[], None) {
            Ok(channel) => {
                self.channel = channel;
                self.state = SupervisorState::Idle;
                Ok(())
            }
            Err(err) => {
                self.state = SupervisorState::Broken;
                Err(err.into())
            }
        }
    }

    /// Compile an inline stylesheet.
    pub fn compile_text(
        &mut self,
        source: &str,
        syntax: Syntax,
        url: Option<Url>,
        options: CompileOptions,
    ) -> Result<CompileOutput> {
        let input = proto::CompileInput::String {
            source: source.to_owned(),
            syntax,
            url: url.map(|url| url.to_string()),
        };
        self.compile(input, options)
    }

    /// Compile a stylesheet from disk. A relative path is resolved
    /// against the current directory before it is sent.
    pub fn compile_file(
        &mut self,
        path: impl AsRef<Utf8Path>,
        options: CompileOptions,
    ) -> Result<CompileOutput> {
        let absolute = absolutize(path.as_ref()).map_err(ProtocolError::Io)?;
        self.compile(proto::CompileInput::Path(absolute.into_string()), options)
    }

    fn compile(
        &mut self,
        input: proto::CompileInput,
        options: CompileOptions,
    ) -> Result<CompileOutput> {
        match self.state {
            SupervisorState::Idle => {}
            SupervisorState::Broken => return Err(LifecycleError::Broken.into()),
            SupervisorState::Active | SupervisorState::ActiveInCallback => {
                return Err(LifecycleError::CompileInProgress.into());
            }
        }

        self.next_compilation_id += 1;
        let mut job = CompileJob::new(
            self.next_compilation_id,
            &self.importers,
            &self.functions,
            &options,
        );

        let request = proto::CompileRequest {
            id: job.id,
            input,
            style: options.style,
            source_map: options.source_map,
            importers: job.importer_descriptors(),
            global_functions: job.signatures.clone(),
        };

        debug!(
            compilation_id = job.id,
            importers = job.importers.len(),
            functions = job.signatures.len(),
            "starting compilation"
        );

        self.state = SupervisorState::Active;
        let started = Instant::now();
        match self.drive(&mut job, request, started) {
            Ok(output) => {
                debug!(compilation_id = job.id, "compilation succeeded");
                self.state = SupervisorState::Idle;
                Ok(output)
            }
            Err(err @ Error::Compiler(_)) => {
                debug!(compilation_id = job.id, "compilation failed");
                self.state = SupervisorState::Idle;
                Err(err)
            }
            Err(err) => {
                warn!(
                    compilation_id = job.id,
                    error = %err,
                    "compilation aborted; restarting the compiler"
                );
                self.channel.terminate();
                match Channel::spawn(&self.exec_path, &[], None) {
                    Ok(channel) => {
                        self.channel = channel;
                        self.state = SupervisorState::Idle;
                    }
                    Err(spawn_err) => {
                        warn!(error = %spawn_err, "restart failed; supervisor is broken");
                        self.state = SupervisorState::Broken;
                    }
                }
                Err(err)
            }
        }
    }

    /// Send the request, then loop on inbound messages until a terminal
    /// `CompileResponse` arrives.
    fn drive(
        &mut self,
        job: &mut CompileJob,
        request: proto::CompileRequest,
        started: Instant,
    ) -> Result<CompileOutput> {
        self.channel
            .send(&InboundMessage::CompileRequest(request))?;

        loop {
            let budget = self
                .timeout
                .map(|total| MIN_RECEIVE_TIMEOUT.max(total.saturating_sub(started.elapsed())));

            match self.channel.receive(budget)? {
                OutboundMessage::CompileResponse(response) => {
                    check_compilation_id(job.id, response.id)?;
                    return match response.result {
                        None => Err(ProtocolError::MissingField("CompileResponse.result").into()),
                        Some(proto::CompileResult::Success { css, source_map }) => {
                            Ok(CompileOutput {
                                css,
                                source_map,
                                diagnostics: std::mem::take(&mut job.diagnostics),
                            })
                        }
                        Some(proto::CompileResult::Failure {
                            message,
                            span,
                            stack_trace,
                            formatted,
                        }) => Err(codec::failure_into_error(
                            message,
                            span,
                            stack_trace,
                            formatted,
                            std::mem::take(&mut job.diagnostics),
                        )
                        .into()),
                    };
                }
                OutboundMessage::LogEvent(event) => {
                    check_compilation_id(job.id, event.compilation_id)?;
                    let diagnostic = codec::decode_log_event(event);
                    debug!(
                        compilation_id = job.id,
                        kind = ?diagnostic.kind,
                        "log event"
                    );
                    if let Some(sink) = self.debug_sink.as_mut() {
                        sink(&diagnostic);
                    }
                    job.diagnostics.push(diagnostic);
                }
                OutboundMessage::Error(event) => {
                    return Err(ProtocolError::Remote(event.message).into());
                }
                OutboundMessage::CanonicalizeRequest(request) => {
                    check_compilation_id(job.id, request.compilation_id)?;
                    debug!(
                        compilation_id = job.id,
                        importer_id = request.importer_id,
                        url = %request.url,
                        "canonicalize request"
                    );
                    self.state = SupervisorState::ActiveInCallback;
                    let response = canonicalize_response(job, request)?;
                    self.channel
                        .send(&InboundMessage::CanonicalizeResponse(response))?;
                    self.state = SupervisorState::Active;
                }
                OutboundMessage::ImportRequest(request) => {
                    check_compilation_id(job.id, request.compilation_id)?;
                    debug!(
                        compilation_id = job.id,
                        importer_id = request.importer_id,
                        url = %request.url,
                        "import request"
                    );
                    self.state = SupervisorState::ActiveInCallback;
                    let response = import_response(job, request)?;
                    self.channel
                        .send(&InboundMessage::ImportResponse(response))?;
                    self.state = SupervisorState::Active;
                }
                OutboundMessage::FunctionCallRequest(request) => {
                    check_compilation_id(job.id, request.compilation_id)?;
                    debug!(
                        compilation_id = job.id,
                        identifier = ?request.identifier,
                        arguments = request.arguments.len(),
                        "function call request"
                    );
                    self.state = SupervisorState::ActiveInCallback;
                    let response = function_call_response(job, request)?;
                    self.channel
                        .send(&InboundMessage::FunctionCallResponse(response))?;
                    self.state = SupervisorState::Active;
                }
            }
        }
    }
}

// ============================================================================
// Per-compilation tables
// ============================================================================

/// Everything one in-flight compilation needs for dispatch.
struct CompileJob {
    id: u32,
    /// Global importers first, then per-call ones; index maps to
    /// importer id.
    importers: Vec<ImportResolver>,
    /// Dispatch table, name → callback. Per-call functions override
    /// globals by name.
    functions: HashMap<String, Arc<HostCallback>>,
    /// Signatures sent up front, in first-registration order.
    signatures: Vec<String>,
    diagnostics: Vec<Diagnostic>,
}

impl CompileJob {
    fn new(
        id: u32,
        global_importers: &[ImportResolver],
        global_functions: &[HostFunction],
        options: &CompileOptions,
    ) -> Self {
        let importers = global_importers
            .iter()
            .chain(options.importers.iter())
            .cloned()
            .collect();

        let mut signatures_by_name: HashMap<String, String> = HashMap::new();
        let mut functions: HashMap<String, Arc<HostCallback>> = HashMap::new();
        let mut order: Vec<String> = Vec::new();
        for function in global_functions.iter().chain(options.functions.iter()) {
            let name = function.name().to_string();
            if functions.insert(name.clone(), function.callback()).is_none() {
                order.push(name.clone());
            }
            signatures_by_name.insert(name, function.signature().to_string());
        }
        let signatures = order
            .iter()
            .map(|name| signatures_by_name[name].clone())
            .collect();

        Self {
            id,
            importers,
            functions,
            signatures,
            diagnostics: Vec::new(),
        }
    }

    fn importer_descriptors(&self) -> Vec<proto::ImporterDescriptor> {
        self.importers
            .iter()
            .enumerate()
            .map(|(index, resolver)| match resolver {
                ImportResolver::LoadPath(path) => {
                    proto::ImporterDescriptor::Path(path.to_string())
                }
                ImportResolver::Importer(_) => {
                    proto::ImporterDescriptor::ImporterId(IMPORTER_ID_BASE + index as u32)
                }
            })
            .collect()
    }

    /// Resolve an importer id to its custom importer. Out-of-range ids
    /// and load-path slots are the compiler's fault.
    fn importer(&self, importer_id: u32) -> std::result::Result<&Arc<dyn Importer>, ProtocolError> {
        let count = self.importers.len() as u32;
        if importer_id < IMPORTER_ID_BASE || importer_id >= IMPORTER_ID_BASE + count {
            return Err(ProtocolError::UnknownImporter(importer_id));
        }
        match &self.importers[(importer_id - IMPORTER_ID_BASE) as usize] {
            ImportResolver::Importer(importer) => Ok(importer),
            ImportResolver::LoadPath(_) => Err(ProtocolError::NotAnImporter(importer_id)),
        }
    }
}

fn check_compilation_id(expected: u32, got: u32) -> std::result::Result<(), ProtocolError> {
    if expected == got {
        Ok(())
    } else {
        Err(ProtocolError::CompilationIdMismatch { expected, got })
    }
}

// ============================================================================
// Callback dispatch
// ============================================================================

fn canonicalize_response(
    job: &CompileJob,
    request: proto::CanonicalizeRequest,
) -> std::result::Result<proto::CanonicalizeResponse, ProtocolError> {
    let importer = job.importer(request.importer_id)?;
    let result = match importer.canonicalize(&request.url) {
        Ok(Some(url)) => proto::CanonicalizeResult::Url(url.to_string()),
        Ok(None) => proto::CanonicalizeResult::NotHandled,
        Err(err) => proto::CanonicalizeResult::Error(err.to_string()),
    };
    Ok(proto::CanonicalizeResponse {
        id: request.id,
        result,
    })
}

fn import_response(
    job: &CompileJob,
    request: proto::ImportRequest,
) -> std::result::Result<proto::ImportResponse, ProtocolError> {
    let importer = job.importer(request.importer_id)?;
    let url = Url::parse(&request.url)
        .map_err(|_| ProtocolError::MalformedUrl(request.url.clone()))?;
    let result = match importer.load(&url) {
        Ok(payload) => proto::ImportResult::Success {
            contents: payload.contents,
            syntax: payload.syntax,
            source_map_url: payload.source_map_url.map(|url| url.to_string()),
        },
        Err(err) => proto::ImportResult::Error(err.to_string()),
    };
    Ok(proto::ImportResponse {
        id: request.id,
        result,
    })
}

fn function_call_response(
    job: &CompileJob,
    request: proto::FunctionCallRequest,
) -> std::result::Result<proto::FunctionCallResponse, ProtocolError> {
    let identifier = request
        .identifier
        .ok_or(ProtocolError::MissingField("FunctionCallRequest.identifier"))?;

    let callback = match &identifier {
        proto::FunctionIdentifier::Id(id) => {
            registry::lookup(*id).map(|function| function.callback())
        }
        proto::FunctionIdentifier::Name(name) => job.functions.get(name.as_str()).cloned(),
    };

    let result = match callback {
        None => {
            let label = match &identifier {
                proto::FunctionIdentifier::Id(id) => format!("id {id}"),
                proto::FunctionIdentifier::Name(name) => format!("name {name:?}"),
            };
            proto::FunctionCallResult::Error(format!("no host function with {label}"))
        }
        Some(callback) => {
            let mut arguments = Vec::with_capacity(request.arguments.len());
            for argument in &request.arguments {
                arguments.push(codec::decode_value(argument)?);
            }
            match callback(&arguments) {
                Ok(value) => proto::FunctionCallResult::Success(codec::encode_value(&value)),
                Err(err) => proto::FunctionCallResult::Error(err.to_string()),
            }
        }
    };

    Ok(proto::FunctionCallResponse {
        id: request.id,
        result,
    })
}

// ============================================================================
// Helpers
// ============================================================================

fn timeout_from_seconds(seconds: i64) -> Option<Duration> {
    (seconds > 0).then(|| Duration::from_secs(seconds as u64))
}

fn absolutize(path: &Utf8Path) -> std::io::Result<Utf8PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_owned());
    }
    let joined = std::env::current_dir()?.join(path.as_std_path());
    Utf8PathBuf::from_path_buf(joined).map_err(|joined| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("current directory is not valid UTF-8: {}", joined.display()),
        )
    })
}

/// The platform `which`: walk `PATH` for an executable file.
fn resolve_executable(name: &str) -> std::result::Result<Utf8PathBuf, LifecycleError> {
    use std::os::unix::fs::PermissionsExt;

    let not_found = || LifecycleError::NotFound(name.to_string());
    let path_var = std::env::var_os("PATH").ok_or_else(not_found)?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(name);
        let Ok(metadata) = candidate.metadata() else {
            continue;
        };
        if metadata.is_file() && metadata.permissions().mode() & 0o111 != 0 {
            if let Ok(candidate) = Utf8PathBuf::from_path_buf(candidate) {
                return Ok(candidate);
            }
        }
    }
    Err(not_found())
}
