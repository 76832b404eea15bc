use stackflow::Output;
use stackflow::config::RunInfo;
use stackflow::output::run_in_callback_scope;
use stackflow::value::{InputMap, InputValue};

/// Build an [`InputMap`] from `(key, value)` pairs.
pub fn inputs<I, K, V>(pairs: I) -> InputMap
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<InputValue>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Default run info for tests: project `proj`, stack `dev`, serialized
/// registrations, quick stall checks.
pub fn test_run_info() -> RunInfo {
    RunInfo::new("proj", "dev").with_stall_check_interval_ms(50)
}

/// Snapshot of a settled output as seen by a runtime-managed callback.
#[derive(Debug, Clone, PartialEq)]
pub struct Observed<T> {
    pub value: Option<T>,
    pub known: bool,
    pub secret: bool,
}

/// Await `output` and report its value and flags.
pub async fn observe<T>(output: &Output<T>) -> Observed<T>
where
    T: Clone + Send + Sync + 'static,
{
    let value = run_in_callback_scope("test observe", output.get())
        .await
        .expect("output rejected");
    Observed {
        value,
        known: output.is_known().await.expect("output rejected"),
        secret: output.is_secret().await.expect("output rejected"),
    }
}
