use corebridge_config::BridgeConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSpec {
    pub name: String,
    pub argcnt: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSpec {
    pub name: String,
    /// Parameter descriptor (`i32,i64`, `*`, ...).
    pub args: String,
    /// Return descriptor (`f64`, `*i32`, or empty).
    pub ret: String,
    pub retsize: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub source_name: String,
    /// Trace every call signature.
    pub debug: bool,
    /// Latch the wall-clock time origin on the first call.
    pub clocks: bool,
    pub imports: Vec<ImportSpec>,
    pub exports: Vec<ExportSpec>,
}

impl RuntimeConfig {
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            debug: false,
            clocks: false,
            imports: vec![],
            exports: vec![],
        }
    }

    pub fn create_from_bridge_config(config: &BridgeConfig) -> Self {
        Self {
            source_name: config.source_name.clone(),
            debug: config.debug,
            clocks: config.clocks,
            imports: config
                .imports
                .iter()
                .map(|(name, import)| ImportSpec {
                    name: name.clone(),
                    argcnt: import.argcnt,
                })
                .collect(),
            exports: config
                .exports
                .iter()
                .map(|(name, export)| ExportSpec {
                    name: name.clone(),
                    args: export.args.clone(),
                    ret: export.ret.clone(),
                    retsize: export.retsize,
                })
                .collect(),
        }
    }

    pub fn with_import(mut self, name: impl Into<String>, argcnt: u32) -> Self {
        self.imports.push(ImportSpec {
            name: name.into(),
            argcnt,
        });
        self
    }

    pub fn with_export(
        mut self,
        name: impl Into<String>,
        args: impl Into<String>,
        ret: impl Into<String>,
        retsize: u32,
    ) -> Self {
        self.exports.push(ExportSpec {
            name: name.into(),
            args: args.into(),
            ret: ret.into(),
            retsize,
        });
        self
    }
}
