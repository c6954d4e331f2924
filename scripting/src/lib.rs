//! dlt-node-scripting: embedded JavaScript backend for dlt-node
//!
//! Load-test scripts are ES modules evaluated by QuickJS. Each executor
//! slot gets its own runtime, so instances share nothing but the host
//! capability bundle.
//!
//! # Script contract
//!
//! ```javascript
//! export default function () {
//!     const start = recordStartTime();
//!     const res = restGet("https://target.example/health");
//!     return buildResult(res.status, recordEndTime(start), res.body);
//! }
//! ```
//!
//! The entry point takes no arguments and returns the result record: a
//! string, or any JSON-serializable value. Throwing fails the invocation.
//!
//! Helpers: `log`, `random`, `restGet`, `restPost`, `restPut`,
//! `restPatch`, `restDelete`, `jsonToMap`, `jsonListToMapList`,
//! `stringSplit`, `stringJoin`, `stringReplaceFirst`, `stringReplace`,
//! `recordStartTime`, `recordEndTime`, `buildResult`.
//!
//! # Compatibility
//!
//! Only JavaScript is accepted. Lua plugins written for earlier dlt-node
//! workers (a `loadTest` table whose `Run` function is the entry point) fail
//! to compile here and abort the session. Coordinators must send ES modules
//! instead. The helpers keep the Lua helper names, so a port mostly means
//! rewriting `loadTest.Run` as `export default function () { ... }`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod host;
pub mod quickjs;

pub use host::{HostCapabilities, DEFAULT_HTTP_TIMEOUT};
pub use quickjs::{QuickJsFactory, QuickJsInstance, BACKEND_NAME};
