use crate::engine::Engine;

use super::config::RuntimeConfig;
use super::descriptor::{CoreFn, CoreSignature};
use super::error::InitError;

/// Initializer-namespace property holding the source module namespace.
pub const SOURCE_MOD_PROPERTY: &str = "$source_mod";

/// Initializer function that binds the source module's exports by name.
pub const BIND_EXPORTS_FUNCTION: &str = "bindExports";

/// Build the export function table.
///
/// Runs once, after the engine has been pre-initialized. The first failure
/// stops the build; it is returned as an [`InitError`] code rather than
/// raised inside the engine.
pub(crate) fn build_export_table<E: Engine>(
    engine: &mut E,
    config: &RuntimeConfig,
) -> Result<Vec<CoreFn<E::Function>>, InitError> {
    tracing::debug!("(init) retrieve and generate the export bindings");
    let namespace = engine.script_namespace().map_err(|e| {
        tracing::error!("(init) source module namespace unavailable: {e}");
        InitError::FnList
    })?;
    engine
        .set_initializer_property(SOURCE_MOD_PROPERTY, namespace)
        .map_err(|e| {
            tracing::error!("(init) unable to publish {SOURCE_MOD_PROPERTY}: {e}");
            InitError::FnList
        })?;

    let source_name = engine.string_value(&config.source_name);
    // The exception, if any, stays pending for check_init to report.
    engine
        .call_initializer_function(BIND_EXPORTS_FUNCTION, &[source_name])
        .map_err(|e| {
            tracing::error!("(init) {BIND_EXPORTS_FUNCTION} failed: {e}");
            InitError::FnList
        })?;

    let mut fns = Vec::with_capacity(config.exports.len());
    for export in config.exports.iter() {
        tracing::debug!("(init) export binding for {}", export.name);
        let Some(func) = engine.get_initializer_function(&export.name) else {
            tracing::error!("(init) export `{}` is not bound to a function", export.name);
            return Err(InitError::FnList);
        };

        let sig = CoreSignature::parse(&export.args, &export.ret, export.retsize).map_err(|e| {
            tracing::error!("(init) export `{}`: {e}", export.name);
            InitError::TypeParse
        })?;

        fns.push(CoreFn {
            name: export.name.clone(),
            sig,
            func,
        });
    }

    tracing::debug!("(init) bound {} exports", fns.len());
    Ok(fns)
}
