use crate::cli::Configuration;
use classdebug_meta::{ClassResolver, Inspector, ReportSink, ResolveError};
use std::io;
use std::thread::{self, JoinHandle};
use tracing::debug;

impl Configuration {
    /// The resolver for this configuration's default context.
    pub fn resolver(&self) -> ClassResolver {
        let resolver = match &self.java_home {
            Some(home) => ClassResolver::new().with_java_home(home),
            None => ClassResolver::from_environment(),
        };
        resolver.with_classpath(self.classpath.iter().cloned())
    }
}

/// Resolves the configured class and writes its report to `sink`.
///
/// A resolution failure is reported once through the sink and returned;
/// no report lines are written in that case.
pub fn debug_class(
    config: &Configuration,
    resolver: &ClassResolver,
    sink: &mut dyn ReportSink,
) -> Result<(), ResolveError> {
    let class = match resolver.resolve(&config.class_name, config.file.as_deref()) {
        Ok(class) => class,
        Err(error) => {
            sink.error(&error);
            return Err(error);
        }
    };
    debug!(class = class.name(), origin = class.origin(), "inspecting");
    Inspector::new().inspect(&class, config.target, sink);
    Ok(())
}

/// Runs the report on a dedicated worker thread. The caller only waits for
/// it to finish so the process does not exit early.
pub fn spawn_report<S>(
    config: Configuration,
    mut sink: S,
) -> io::Result<JoinHandle<Result<(), ResolveError>>>
where
    S: ReportSink + Send + 'static,
{
    thread::Builder::new()
        .name("class-debug".to_string())
        .spawn(move || {
            let resolver = config.resolver();
            debug_class(&config, &resolver, &mut sink)
        })
}
