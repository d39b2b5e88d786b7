//! Restricted Lua state for open-event scripts.
//!
//! The state loads only pure standard libraries (`string`, `table`, `math`,
//! `utf8`, `coroutine`). No `io`, `os`, `package` or `debug`: the script can
//! only reach the outside world through the globals installed here.
//!
//! # Globals
//!
//! ```lua
//! auth.access_token, auth.client_id, auth.client_secret
//!
//! send(data)                  -- fire and forget
//! local reply = send(data, true)  -- wait for the next inbound message
//!
//! get_parameter("accessCode")
//! get_static_state("key")
//! set_static_state("key", value)
//!
//! resolve()
//! reject("reason")
//!
//! log.info("...")  -- also debug, warn, error
//! ```
//!
//! # Watchdog
//!
//! The script thread carries an instruction-count hook. Every
//! [`WATCH_INTERVAL`] instructions it checks the socket and the settlement,
//! and raises an error once the socket is gone or the handshake has settled.
//! A script stuck in a loop that never calls `send` is stopped this way.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use mlua::{HookTriggers, Lua, LuaOptions, LuaSerdeExt, StdLib, Thread, Value, VmState};
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::Result;
use crate::protocol::Outbound;

use super::context::{HandshakeContext, HandshakeSocket};

// ============================================================================
// Settlement
// ============================================================================

/// Explicit completion recorded by `resolve` / `reject`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Settlement {
    Resolved,
    Rejected(String),
}

/// Holds the first settlement and wakes whoever awaits it.
#[derive(Debug, Default)]
pub(crate) struct SettlementSlot {
    value: Mutex<Option<Settlement>>,
    notify: Notify,
}

impl SettlementSlot {
    /// Records `settlement` unless one is already recorded.
    pub(crate) fn settle(&self, settlement: Settlement) {
        let mut guard = self.value.lock();
        if guard.is_none() {
            *guard = Some(settlement);
            drop(guard);
            self.notify.notify_one();
        }
    }

    /// Returns the recorded settlement, if any.
    pub(crate) fn get(&self) -> Option<Settlement> {
        self.value.lock().clone()
    }

    #[inline]
    pub(crate) fn is_settled(&self) -> bool {
        self.value.lock().is_some()
    }

    /// Waits until the script calls `resolve` or `reject`.
    pub(crate) async fn settled(&self) -> Settlement {
        loop {
            let notified = self.notify.notified();
            if let Some(settlement) = self.get() {
                return settlement;
            }
            notified.await;
        }
    }
}

// ============================================================================
// State Construction
// ============================================================================

/// Base-library globals that reach the filesystem, stdout or raw chunks.
const REMOVED_BASE_GLOBALS: [&str; 4] = ["dofile", "loadfile", "load", "print"];

/// Creates a Lua state with pure libraries only.
pub(crate) fn new_state() -> Result<Lua> {
    let libs = StdLib::STRING | StdLib::TABLE | StdLib::MATH | StdLib::UTF8 | StdLib::COROUTINE;
    let lua = Lua::new_with(libs, LuaOptions::default())?;

    let globals = lua.globals();
    for name in REMOVED_BASE_GLOBALS {
        globals.raw_set(name, Value::Nil)?;
    }

    Ok(lua)
}

/// Installs the capability globals for one handshake.
pub(crate) fn install(lua: &Lua, ctx: &HandshakeContext, settlement: &Arc<SettlementSlot>) -> Result<()> {
    let globals = lua.globals();

    // auth
    let auth = lua.create_table()?;
    auth.set("access_token", ctx.auth.access_token.as_str())?;
    auth.set("client_id", ctx.auth.client_id.as_str())?;
    auth.set("client_secret", ctx.auth.client_secret.as_str())?;
    globals.set("auth", auth)?;

    // send(data, wait_for_reply)
    let socket = Arc::clone(&ctx.socket);
    let send_fn = lua.create_async_function(move |lua, (data, wait): (Value, Option<bool>)| {
        let socket = Arc::clone(&socket);
        async move {
            let text = to_outbound(&lua, data)?
                .into_text()
                .map_err(mlua::Error::external)?;

            if wait.unwrap_or(false) {
                let reply = socket
                    .send_and_wait(text)
                    .await
                    .map_err(mlua::Error::external)?;
                json_to_lua(&lua, &reply.into_value())
            } else {
                socket.send_text(text).await.map_err(mlua::Error::external)?;
                Ok(Value::Nil)
            }
        }
    })?;
    globals.set("send", send_fn)?;

    // get_parameter(name)
    let parameters = Arc::clone(&ctx.parameters);
    let get_parameter_fn = lua.create_function(move |lua, name: String| match parameters.get(&name) {
        Some(value) => json_to_lua(lua, value),
        None => Ok(Value::Nil),
    })?;
    globals.set("get_parameter", get_parameter_fn)?;

    // get_static_state(key) / set_static_state(key, value)
    let state = ctx.static_state.clone();
    let get_state_fn = lua.create_function(move |lua, key: String| match state.get(&key) {
        Some(value) => json_to_lua(lua, &value),
        None => Ok(Value::Nil),
    })?;
    globals.set("get_static_state", get_state_fn)?;

    let state = ctx.static_state.clone();
    let set_state_fn = lua.create_function(move |lua, (key, value): (String, Value)| {
        let value: serde_json::Value = lua.from_value(value)?;
        state.set(key, value);
        Ok(())
    })?;
    globals.set("set_static_state", set_state_fn)?;

    // resolve() / reject(reason)
    let slot = Arc::clone(settlement);
    let resolve_fn = lua.create_function(move |_, ()| {
        slot.settle(Settlement::Resolved);
        Ok(())
    })?;
    globals.set("resolve", resolve_fn)?;

    let slot = Arc::clone(settlement);
    let reject_fn = lua.create_function(move |_, reason: Option<String>| -> mlua::Result<()> {
        let reason = reason.unwrap_or_else(|| "rejected".to_string());
        slot.settle(Settlement::Rejected(reason.clone()));
        Err(mlua::Error::runtime(reason))
    })?;
    globals.set("reject", reject_fn)?;

    register_log(lua)?;

    Ok(())
}

// ============================================================================
// Watchdog
// ============================================================================

/// Instructions executed between two watchdog checks.
pub(crate) const WATCH_INTERVAL: u32 = 10_000;

/// Stops `thread` once `socket` closes or `settlement` is recorded.
pub(crate) fn watch(
    thread: &Thread,
    socket: Arc<dyn HandshakeSocket>,
    settlement: Arc<SettlementSlot>,
) {
    let triggers = HookTriggers::new().every_nth_instruction(WATCH_INTERVAL);
    thread.set_hook(triggers, move |_, _| {
        if !socket.is_open() {
            return Err(mlua::Error::runtime("connection closed while the script was running"));
        }
        if settlement.is_settled() {
            return Err(mlua::Error::runtime("handshake already settled"));
        }
        Ok(VmState::Continue)
    });
}

/// Installs the `log` table, routed to `tracing`.
fn register_log(lua: &Lua) -> Result<()> {
    let log_table = lua.create_table()?;

    log_table.set(
        "debug",
        lua.create_function(|_, msg: String| {
            tracing::debug!(target: "websocket_trigger::script", "{msg}");
            Ok(())
        })?,
    )?;
    log_table.set(
        "info",
        lua.create_function(|_, msg: String| {
            tracing::info!(target: "websocket_trigger::script", "{msg}");
            Ok(())
        })?,
    )?;
    log_table.set(
        "warn",
        lua.create_function(|_, msg: String| {
            tracing::warn!(target: "websocket_trigger::script", "{msg}");
            Ok(())
        })?,
    )?;
    log_table.set(
        "error",
        lua.create_function(|_, msg: String| {
            tracing::error!(target: "websocket_trigger::script", "{msg}");
            Ok(())
        })?,
    )?;

    lua.globals().set("log", log_table)?;
    Ok(())
}

// ============================================================================
// Value Conversion
// ============================================================================

/// Converts a Lua value handed to `send` into outbound data.
///
/// Strings pass through, everything else is JSON-encoded.
fn to_outbound(lua: &Lua, data: Value) -> mlua::Result<Outbound> {
    match data {
        Value::String(s) => Ok(Outbound::Text(s.to_str()?.to_string())),
        other => Ok(Outbound::Json(lua.from_value(other)?)),
    }
}

/// Converts JSON to a Lua value, mapping `null` to `nil`.
///
/// The serde bridge maps `null` to a truthy sentinel; scripts expect `nil`.
pub(crate) fn json_to_lua(lua: &Lua, value: &serde_json::Value) -> mlua::Result<Value> {
    match value {
        serde_json::Value::Null => Ok(Value::Nil),
        serde_json::Value::Bool(b) => Ok(Value::Boolean(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Integer(i))
            } else if let Some(f) = n.as_f64() {
                Ok(Value::Number(f))
            } else {
                Ok(Value::Nil)
            }
        }
        serde_json::Value::String(s) => lua.create_string(s).map(Value::String),
        serde_json::Value::Array(items) => {
            let table = lua.create_table()?;
            for (i, item) in items.iter().enumerate() {
                table.set(i + 1, json_to_lua(lua, item)?)?;
            }
            Ok(Value::Table(table))
        }
        serde_json::Value::Object(map) => {
            let table = lua.create_table()?;
            for (key, item) in map {
                if !item.is_null() {
                    table.set(lua.create_string(key)?, json_to_lua(lua, item)?)?;
                }
            }
            Ok(Value::Table(table))
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_state_has_no_ambient_libraries() {
        let lua = new_state().unwrap();
        for name in ["io", "os", "package", "debug", "require", "dofile", "loadfile", "load", "print"] {
            let value: Value = lua.globals().get(name).unwrap();
            assert!(value.is_nil(), "{name} should not be reachable");
        }
    }

    #[test]
    fn test_state_keeps_pure_libraries() {
        let lua = new_state().unwrap();
        let upper: String = lua.load(r#"return string.upper("ok")"#).eval().unwrap();
        assert_eq!(upper, "OK");
        let max: i64 = lua.load("return math.max(1, 5, 3)").eval().unwrap();
        assert_eq!(max, 5);
    }

    #[test]
    fn test_json_to_lua_null_is_nil() {
        let lua = new_state().unwrap();
        let value = json_to_lua(&lua, &json!({"a": null, "b": 1})).unwrap();
        let table = value.as_table().unwrap();
        assert!(table.get::<Value>("a").unwrap().is_nil());
        assert_eq!(table.get::<i64>("b").unwrap(), 1);
    }

    #[test]
    fn test_json_to_lua_array_is_one_based() {
        let lua = new_state().unwrap();
        let value = json_to_lua(&lua, &json!(["x", "y"])).unwrap();
        let table = value.as_table().unwrap();
        assert_eq!(table.get::<String>(1).unwrap(), "x");
        assert_eq!(table.get::<String>(2).unwrap(), "y");
    }

    #[test]
    fn test_to_outbound_string_passthrough() {
        let lua = new_state().unwrap();
        let data = Value::String(lua.create_string("raw").unwrap());
        assert_eq!(to_outbound(&lua, data).unwrap(), Outbound::Text("raw".into()));
    }

    #[test]
    fn test_to_outbound_table_is_json() {
        let lua = new_state().unwrap();
        let data: Value = lua.load(r#"return { action = "register" }"#).eval().unwrap();
        assert_eq!(
            to_outbound(&lua, data).unwrap(),
            Outbound::Json(json!({"action": "register"}))
        );
    }

    #[test]
    fn test_first_settlement_wins() {
        let slot = SettlementSlot::default();
        assert!(!slot.is_settled());
        slot.settle(Settlement::Resolved);
        slot.settle(Settlement::Rejected("late".into()));
        assert_eq!(slot.get(), Some(Settlement::Resolved));
    }

    #[tokio::test]
    async fn test_settled_wakes_waiter() {
        let slot = Arc::new(SettlementSlot::default());
        let waiter = tokio::spawn({
            let slot = Arc::clone(&slot);
            async move { slot.settled().await }
        });

        tokio::task::yield_now().await;
        slot.settle(Settlement::Rejected("denied".into()));

        assert_eq!(waiter.await.unwrap(), Settlement::Rejected("denied".into()));
    }

    #[tokio::test]
    async fn test_settled_returns_earlier_settlement() {
        let slot = SettlementSlot::default();
        slot.settle(Settlement::Resolved);
        assert_eq!(slot.settled().await, Settlement::Resolved);
    }
}
