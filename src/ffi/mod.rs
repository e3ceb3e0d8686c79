//! # C ABI engine adapter
//!
//! Connects the bridge to an engine exported as C functions. The engine is
//! described by an [`EngineVTable`]; [`ForeignConnector`] implements
//! [`Connector`] on top of it, so a foreign engine plugs into
//! [`ClientBuilder::connect`](crate::ClientBuilder::connect) like any other.
//!
//! ## Callbacks
//!
//! The engine receives two `extern "C"` callbacks and an opaque `context`
//! when a client is created, and reports each request by calling one of
//! them with the context and the request's token. The context is a handle
//! into a process-wide table; it stays valid until the client is closed and
//! is ignored afterwards. Callbacks may be invoked from any thread and never
//! unwind into the engine.
//!
//! ## Memory
//!
//! Everything passed to `command`, `batch`, `cluster_scan` and
//! `update_password` (argument arrays, route bytes, batch descriptors,
//! cursor and password strings) is only valid for the duration of the call.
//! The engine must copy what it keeps. Error strings returned by the engine
//! are released with its `free_error`.
//!
//! ## Scan cursors
//!
//! Every cursor id a `cluster_scan` reply hands out, except `"finished"`,
//! is later passed to `remove_scan_cursor` exactly once, unless the client
//! is closed first. The engine drops all of a client's cursors on close.

use std::ffi::{c_char, c_void, CStr, CString};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;

use bytes::Bytes;
use tracing::{error, trace, warn};

use crate::core::command::Cmd;
use crate::core::completion::Completions;
use crate::core::engine::{Connector, Engine, EngineError, WireBatchOptions, WirePayload, WireRequest};
use crate::core::registry::Token;
use crate::proto::error::RequestErrorType;

mod handles;

/// Called by the engine when a request succeeds. `payload` holds one
/// complete RESP value and is only read during the call.
pub type SuccessCallback =
    extern "C" fn(context: u64, token: u64, payload: *const u8, payload_len: usize);

/// Called by the engine when a request fails. `message` is a NUL-terminated
/// string, only read during the call. `kind` is a [`RequestErrorType`]
/// discriminant; unknown values are treated as `Unspecified`.
pub type FailureCallback =
    extern "C" fn(context: u64, token: u64, message: *const c_char, kind: u32);

/// One command: operation code and binary arguments.
#[repr(C)]
#[derive(Debug)]
pub struct CommandInfo {
    /// [`RequestType`](crate::RequestType) code.
    pub request_type: u32,
    /// Pointers to the argument bytes.
    pub args: *const *const u8,
    /// Argument lengths, parallel to `args`.
    pub args_len: *const usize,
    /// Number of arguments.
    pub arg_count: usize,
}

/// An ordered group of commands.
#[repr(C)]
#[derive(Debug)]
pub struct BatchInfo {
    /// The commands, MULTI/EXEC included for atomic batches.
    pub cmds: *const CommandInfo,
    /// Number of commands.
    pub cmd_count: usize,
    /// Transaction or pipeline.
    pub is_atomic: bool,
}

/// Per-batch options.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOptionsInfo {
    /// Retry commands that failed with a server error.
    pub retry_server_error: bool,
    /// Retry after a connection error.
    pub retry_connection_error: bool,
    /// Whether `timeout_ms` is set.
    pub has_timeout: bool,
    /// Batch timeout in milliseconds.
    pub timeout_ms: u32,
}

/// Entry points of a foreign engine.
///
/// Functions returning `*mut c_char` return null on success and an error
/// message, owned by the engine, on failure.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct EngineVTable {
    /// Creates a client. Returns null and sets `*error` on failure.
    pub create_client: unsafe extern "C" fn(
        connection_request: *const u8,
        connection_request_len: usize,
        context: u64,
        success: SuccessCallback,
        failure: FailureCallback,
        error: *mut *mut c_char,
    ) -> *const c_void,
    /// Submits one command.
    pub command: unsafe extern "C" fn(
        client: *const c_void,
        token: u64,
        cmd: *const CommandInfo,
        route: *const u8,
        route_len: usize,
    ) -> *mut c_char,
    /// Submits a batch.
    pub batch: unsafe extern "C" fn(
        client: *const c_void,
        token: u64,
        batch: *const BatchInfo,
        options: *const BatchOptionsInfo,
        route: *const u8,
        route_len: usize,
    ) -> *mut c_char,
    /// Runs one cluster scan step from the NUL-terminated `cursor`. `args`
    /// hold the `MATCH`/`COUNT`/`TYPE` pairs. Replies `[cursor, [keys...]]`.
    pub cluster_scan: unsafe extern "C" fn(
        client: *const c_void,
        token: u64,
        cursor: *const c_char,
        args: *const *const u8,
        args_len: *const usize,
        arg_count: usize,
    ) -> *mut c_char,
    /// Frees the engine state behind a scan cursor id.
    pub remove_scan_cursor: unsafe extern "C" fn(client: *const c_void, cursor: *const c_char),
    /// Replaces the connection password; null removes it. Replies `OK`.
    pub update_password: unsafe extern "C" fn(
        client: *const c_void,
        token: u64,
        password: *const c_char,
        immediate_auth: bool,
    ) -> *mut c_char,
    /// Releases a client. Called once per client.
    pub close_client: unsafe extern "C" fn(client: *const c_void),
    /// Releases an error string returned by the engine.
    pub free_error: unsafe extern "C" fn(error: *mut c_char),
}

impl fmt::Debug for EngineVTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineVTable").finish_non_exhaustive()
    }
}

/// [`Connector`] for an engine exported through an [`EngineVTable`].
#[derive(Debug, Clone, Copy)]
pub struct ForeignConnector {
    vtable: EngineVTable,
}

impl ForeignConnector {
    /// Wraps an engine's entry points.
    ///
    /// # Safety
    ///
    /// Every function in `vtable` must follow the contract documented on
    /// [`EngineVTable`] and in the [module docs](self): clients are usable
    /// from any thread, borrowed inputs are not retained past the call, and
    /// each accepted request is reported exactly once through the callbacks.
    pub unsafe fn new(vtable: EngineVTable) -> Self {
        Self { vtable }
    }
}

impl Connector for ForeignConnector {
    fn connect(
        &self,
        connection_request: &[u8],
        completions: Completions,
    ) -> Result<Box<dyn Engine>, EngineError> {
        let context = handles::register(completions);
        let mut error: *mut c_char = ptr::null_mut();

        // SAFETY: the request slice outlives the call and the vtable
        // contract was asserted in `ForeignConnector::new`.
        let client = unsafe {
            (self.vtable.create_client)(
                connection_request.as_ptr(),
                connection_request.len(),
                context,
                on_success,
                on_failure,
                &mut error,
            )
        };

        if client.is_null() {
            handles::release(context);
            let message = take_error(&self.vtable, error)
                .unwrap_or_else(|| "engine returned no client".to_string());
            return Err(EngineError::new(message));
        }

        trace!(context, "foreign client created");
        Ok(Box::new(ForeignEngine {
            vtable: self.vtable,
            client,
            context,
        }))
    }
}

/// A client created by a foreign engine.
struct ForeignEngine {
    vtable: EngineVTable,
    client: *const c_void,
    context: u64,
}

// SAFETY: the engine contract requires clients to be usable from any thread.
unsafe impl Send for ForeignEngine {}
// SAFETY: as above; the bridge never mutates through `client`.
unsafe impl Sync for ForeignEngine {}

impl Engine for ForeignEngine {
    fn submit(&self, request: WireRequest<'_>, token: Token) -> Result<(), EngineError> {
        let (route, route_len) = match request.route {
            Some(route) => (route.as_ptr(), route.len()),
            None => (ptr::null(), 0),
        };

        let error = match request.payload {
            WirePayload::Command(cmd) => {
                let scratch = ScratchCommand::new(cmd);
                let info = scratch.info();
                // SAFETY: `scratch`, `info` and the route bytes live until the
                // end of this block, past the call.
                unsafe {
                    (self.vtable.command)(self.client, token.as_raw(), &info, route, route_len)
                }
            }
            WirePayload::Batch {
                commands,
                atomic,
                options,
            } => {
                let scratch: Vec<ScratchCommand<'_>> =
                    commands.iter().map(ScratchCommand::new).collect();
                let infos: Vec<CommandInfo> = scratch.iter().map(ScratchCommand::info).collect();
                let batch = BatchInfo {
                    cmds: infos.as_ptr(),
                    cmd_count: infos.len(),
                    is_atomic: atomic,
                };
                let options = batch_options(options);
                // SAFETY: every pointer in `batch` targets `scratch` or
                // `infos`, both alive until the end of this block.
                unsafe {
                    (self.vtable.batch)(
                        self.client,
                        token.as_raw(),
                        &batch,
                        &options,
                        route,
                        route_len,
                    )
                }
            }
            WirePayload::ClusterScan { cursor, args } => {
                let cursor = c_string(cursor, "scan cursor")?;
                let scratch = ScratchArgs::new(args);
                // SAFETY: `cursor` and `scratch` live until the end of this
                // block, past the call.
                unsafe {
                    (self.vtable.cluster_scan)(
                        self.client,
                        token.as_raw(),
                        cursor.as_ptr(),
                        scratch.ptrs.as_ptr(),
                        scratch.lens.as_ptr(),
                        scratch.ptrs.len(),
                    )
                }
            }
            WirePayload::UpdatePassword {
                password,
                immediate_auth,
            } => {
                let password = password.map(|p| c_string(p, "password")).transpose()?;
                let password_ptr = password.as_ref().map_or(ptr::null(), |p| p.as_ptr());
                // SAFETY: `password` lives until the end of this block.
                unsafe {
                    (self.vtable.update_password)(
                        self.client,
                        token.as_raw(),
                        password_ptr,
                        immediate_auth,
                    )
                }
            }
        };

        match take_error(&self.vtable, error) {
            Some(message) => Err(EngineError::new(message)),
            None => Ok(()),
        }
    }

    fn release_scan_cursor(&self, cursor: &str) {
        let Ok(cursor) = CString::new(cursor) else {
            warn!(context = self.context, "scan cursor with a NUL byte not released");
            return;
        };
        // SAFETY: the client is open; the lifecycle manager never releases
        // cursors after `close`.
        unsafe { (self.vtable.remove_scan_cursor)(self.client, cursor.as_ptr()) };
    }

    fn close(&self) {
        // SAFETY: `client` came from `create_client` and `close` is called
        // exactly once by the lifecycle manager.
        unsafe { (self.vtable.close_client)(self.client) };
        handles::release(self.context);
        trace!(context = self.context, "foreign client closed");
    }
}

/// Pointer and length arrays borrowing a list of arguments.
struct ScratchArgs<'a> {
    ptrs: Vec<*const u8>,
    lens: Vec<usize>,
    _args: std::marker::PhantomData<&'a [Bytes]>,
}

impl<'a> ScratchArgs<'a> {
    fn new(args: &'a [Bytes]) -> Self {
        Self {
            ptrs: args.iter().map(|arg| arg.as_ptr()).collect(),
            lens: args.iter().map(|arg| arg.len()).collect(),
            _args: std::marker::PhantomData,
        }
    }
}

/// Argument arrays for one command.
struct ScratchCommand<'a> {
    request_type: u32,
    args: ScratchArgs<'a>,
}

impl<'a> ScratchCommand<'a> {
    fn new(cmd: &'a Cmd) -> Self {
        Self {
            request_type: cmd.request_type().code(),
            args: ScratchArgs::new(cmd.args()),
        }
    }

    fn info(&self) -> CommandInfo {
        CommandInfo {
            request_type: self.request_type,
            args: self.args.ptrs.as_ptr(),
            args_len: self.args.lens.as_ptr(),
            arg_count: self.args.ptrs.len(),
        }
    }
}

fn c_string(value: &str, what: &str) -> Result<CString, EngineError> {
    CString::new(value).map_err(|_| EngineError::new(format!("{what} contains a NUL byte")))
}

fn batch_options(options: WireBatchOptions) -> BatchOptionsInfo {
    let timeout_ms = options
        .timeout
        .map(|t| u32::try_from(t.as_millis()).unwrap_or(u32::MAX));
    BatchOptionsInfo {
        retry_server_error: options.retry_server_error,
        retry_connection_error: options.retry_connection_error,
        has_timeout: timeout_ms.is_some(),
        timeout_ms: timeout_ms.unwrap_or(0),
    }
}

/// Copies and frees an engine error string.
fn take_error(vtable: &EngineVTable, error: *mut c_char) -> Option<String> {
    if error.is_null() {
        return None;
    }
    // SAFETY: non-null errors are NUL-terminated strings owned by the
    // engine until `free_error`.
    let message = unsafe { CStr::from_ptr(error) }.to_string_lossy().into_owned();
    // SAFETY: released exactly once, after the copy above.
    unsafe { (vtable.free_error)(error) };
    Some(message)
}

fn error_type(kind: u32) -> RequestErrorType {
    match kind {
        1 => RequestErrorType::ExecAbort,
        2 => RequestErrorType::Timeout,
        3 => RequestErrorType::Disconnect,
        _ => RequestErrorType::Unspecified,
    }
}

extern "C" fn on_success(context: u64, token: u64, payload: *const u8, payload_len: usize) {
    let result = catch_unwind(AssertUnwindSafe(|| {
        let Some(completions) = handles::lookup(context) else {
            trace!(context, token, "success for released context ignored");
            return;
        };
        let payload = if payload.is_null() || payload_len == 0 {
            &[][..]
        } else {
            // SAFETY: the engine guarantees `payload_len` readable bytes for
            // the duration of the callback.
            unsafe { std::slice::from_raw_parts(payload, payload_len) }
        };
        completions.on_complete(Token::from_raw(token), payload);
    }));
    if result.is_err() {
        error!(context, token, "panic in success callback");
    }
}

extern "C" fn on_failure(context: u64, token: u64, message: *const c_char, kind: u32) {
    let result = catch_unwind(AssertUnwindSafe(|| {
        let Some(completions) = handles::lookup(context) else {
            trace!(context, token, "failure for released context ignored");
            return;
        };
        let message = if message.is_null() {
            std::borrow::Cow::Borrowed("")
        } else {
            // SAFETY: non-null messages are NUL-terminated for the duration
            // of the callback.
            unsafe { CStr::from_ptr(message) }.to_string_lossy()
        };
        completions.on_failure(Token::from_raw(token), &message, error_type(kind));
    }));
    if result.is_err() {
        error!(context, token, "panic in failure callback");
    }
}
