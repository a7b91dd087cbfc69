//! Lua bootstrap code loaded into every runtime.
//!
//! Scripts are embedded at compile time using `include_str!` and run after
//! the host bindings are installed, so they may use `json`, `Println` and
//! `TimeMS`.

use mlua::Lua;

/// `events` table: subscribe / unsubscribe / post.
pub const EVENTS: &str = include_str!("../scripts/events.lua");

/// `network` table and `E_*` error codes.
pub const NETWORK: &str = include_str!("../scripts/network.lua");

/// All preludes in load order, as `(name, source)`.
#[must_use]
pub fn all() -> [(&'static str, &'static str); 2] {
    [("events", EVENTS), ("network", NETWORK)]
}

/// Gets a prelude by name.
#[must_use]
pub fn get(name: &str) -> Option<&'static str> {
    all().into_iter().find(|(n, _)| *n == name).map(|(_, s)| s)
}

pub(crate) fn load(lua: &Lua) -> mlua::Result<()> {
    for (name, source) in all() {
        lua.load(source).set_name(format!("=prelude:{name}")).exec()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preludes_embedded() {
        assert!(EVENTS.contains("function events.post"));
        assert!(NETWORK.contains("E_BAD_PARAMS = -32602"));
    }

    #[test]
    fn get_by_name() {
        assert!(get("events").is_some());
        assert!(get("network").is_some());
        assert!(get("missing").is_none());
    }

    #[test]
    fn preludes_compile() {
        let lua = Lua::new();
        for (name, source) in all() {
            lua.load(source)
                .set_name(name)
                .into_function()
                .unwrap_or_else(|e| panic!("{name} does not compile: {e}"));
        }
    }
}
