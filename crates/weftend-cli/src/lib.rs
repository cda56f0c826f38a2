//! Command-line interface for weftend (§6): argument parsing, `tracing`
//! initialization, and mapping a terminal [`WeftEndError`] to the documented
//! exit code. Grounded on the teacher's split between a thin `main.rs` that
//! only calls `cli::run()` and maps `Result<(), ExitCode>` to
//! `std::process::exit`.

use std::path::PathBuf;
use std::str::FromStr;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use weftend_adapters::AdapterSelection;
use weftend_policy::Profile;
use weftend_receipt::PrivacyLintVerdict;
use weftend_util::error::{ExitCode, WeftEndError};

#[derive(Parser)]
#[command(name = "weftend", version, about = "Deterministic, local, fail-closed artifact intake and triage scanner")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the safe-run pipeline over a single artifact (§4.5).
    SafeRun(SafeRunArgs),
    /// Compare two prior runs of the same target (§4.10).
    Compare(CompareArgs),
    /// Reduce a bounded event stream to a proof-only verdict (§4.11).
    ShadowAudit(ShadowAuditArgs),
    /// Library view-state operator operations (§4.9).
    Library {
        #[command(subcommand)]
        action: LibraryAction,
    },
}

#[derive(Args)]
struct SafeRunArgs {
    /// Path to the artifact or release directory to scan.
    input: PathBuf,
    /// Output directory (must not already exist as a non-directory).
    #[arg(long = "out")]
    out: PathBuf,
    /// Path to a policy document; defaults to the generic default policy.
    #[arg(long = "policy")]
    policy: Option<PathBuf>,
    /// Deployment profile.
    #[arg(long = "profile", default_value = "generic")]
    profile: String,
    /// Request execution of a release artifact.
    #[arg(long = "execute", conflicts_with = "withhold_exec")]
    execute: bool,
    /// Explicitly withhold execution even if the artifact is eligible.
    #[arg(long = "withhold-exec")]
    withhold_exec: bool,
    /// Adapter selection: auto, none, or a specific class.
    #[arg(long = "adapter", default_value = "auto")]
    adapter: String,
    /// Enable an optional plugin by name; may be repeated.
    #[arg(long = "enable-plugin")]
    enable_plugin: Vec<String>,
}

#[derive(Args)]
struct CompareArgs {
    /// Library target key shared by both runs.
    target_key: String,
    /// The baseline run id.
    left_run_id: String,
    /// The candidate run id.
    right_run_id: String,
    /// Library root; defaults to `WEFTEND_LIBRARY_ROOT` or `./Library`.
    #[arg(long = "library-root")]
    library_root: Option<PathBuf>,
}

#[derive(Args)]
struct ShadowAuditArgs {
    /// Path to a JSON array of event objects.
    events: PathBuf,
    /// Policy document supplying `denyThresholds`; defaults to none.
    #[arg(long = "policy")]
    policy: Option<PathBuf>,
}

#[derive(Subcommand)]
enum LibraryAction {
    /// Promote the latest run to baseline and clear any blocked record.
    AcceptBaseline { target_key: String, #[arg(long = "library-root")] library_root: Option<PathBuf> },
    /// Block the latest run without moving the baseline.
    RejectBaseline { target_key: String, #[arg(long = "library-root")] library_root: Option<PathBuf> },
}

fn utf8_path(path: PathBuf) -> Result<Utf8PathBuf, WeftEndError> {
    Utf8PathBuf::from_path_buf(path)
        .map_err(|p| WeftEndError::input("INPUT_INVALID", format!("path is not valid UTF-8: {}", p.display())))
}

fn library_root(explicit: Option<PathBuf>) -> Result<Utf8PathBuf, WeftEndError> {
    match explicit {
        Some(path) => utf8_path(path),
        None => Ok(std::env::var("WEFTEND_LIBRARY_ROOT")
            .map(Utf8PathBuf::from)
            .unwrap_or_else(|_| Utf8PathBuf::from("./Library"))),
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("WEFTEND_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Parse `argv`, run the selected command, and return the documented exit
/// code (§6). Never panics on malformed input; unknown flags, missing flag
/// values, duplicate singleton flags, and unexpected positionals are turned
/// into clap's own usage error, reported and mapped to `INPUT_INVALID`.
pub fn run<I, T>(args: I) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    init_tracing();
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("[INPUT_INVALID] {e}");
            return ExitCode::FAIL_CLOSED;
        }
    };
    match dispatch(cli.command) {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            err.to_exit_code()
        }
    }
}

fn report_error(err: &WeftEndError) {
    eprintln!("{err}");
}

fn dispatch(command: Command) -> Result<ExitCode, WeftEndError> {
    match command {
        Command::SafeRun(args) => run_safe_run(args),
        Command::Compare(args) => run_compare(args),
        Command::ShadowAudit(args) => run_shadow_audit(args),
        Command::Library { action } => run_library_action(action),
    }
}

fn run_safe_run(args: SafeRunArgs) -> Result<ExitCode, WeftEndError> {
    if args.execute && args.withhold_exec {
        return Err(WeftEndError::input(
            "INPUT_INVALID",
            "--execute and --withhold-exec are mutually exclusive",
        ));
    }
    let profile = Profile::from_str(&args.profile)?;
    let adapter = parse_adapter_selection(&args.adapter)?;

    let request = weftend_orchestrator::SafeRunRequest {
        input_path: utf8_path(args.input)?,
        out_dir: utf8_path(args.out)?,
        policy_path: args.policy.map(utf8_path).transpose()?,
        profile,
        execute_requested: args.execute,
        withhold_exec: args.withhold_exec,
        adapter,
        enabled_plugins: args.enable_plugin,
        script_path: None,
    };

    let outcome = weftend_orchestrator::safe_run(&request)?;
    print_safe_run_summary(&outcome);
    Ok(outcome.exit_code)
}

const KNOWN_ADAPTER_CLASSES: &[&str] = &[
    "archive", "package", "extension", "iac", "cicd", "document", "container", "image", "scm",
    "signature",
];

fn parse_adapter_selection(raw: &str) -> Result<AdapterSelection, WeftEndError> {
    match raw {
        "auto" => Ok(AdapterSelection::Auto),
        "none" => Ok(AdapterSelection::None),
        class if KNOWN_ADAPTER_CLASSES.contains(&class) => Ok(AdapterSelection::Class(class.to_string())),
        other => Err(WeftEndError::input(
            "INPUT_INVALID",
            format!("unknown adapter selection: {other}"),
        )),
    }
}

fn print_safe_run_summary(outcome: &weftend_orchestrator::SafeRunOutcome) {
    let receipt = &outcome.safe_run_receipt;
    println!(
        "SAFE_RUN {verdict} inputKind={input_kind} kind={kind} exec={exec} reason={reason} buildDigest={build_digest} privacyLint={privacy}",
        verdict = verdict_str(receipt.analysis_verdict),
        input_kind = input_kind_str(receipt.input_kind),
        kind = receipt.artifact_kind,
        exec = exec_str(receipt.execution_verdict),
        reason = receipt.top_reason_code,
        build_digest = receipt.receipt_digest,
        privacy = privacy_str(outcome.operator_receipt.privacy_lint),
    );
}

fn verdict_str(v: weftend_receipt::AnalysisVerdict) -> &'static str {
    match v {
        weftend_receipt::AnalysisVerdict::Allow => "ALLOW",
        weftend_receipt::AnalysisVerdict::Deny => "DENY",
        weftend_receipt::AnalysisVerdict::Withheld => "WITHHELD",
    }
}

fn input_kind_str(k: weftend_receipt::InputKind) -> &'static str {
    match k {
        weftend_receipt::InputKind::Raw => "raw",
        weftend_receipt::InputKind::Release => "release",
    }
}

fn exec_str(v: weftend_receipt::ExecutionVerdict) -> &'static str {
    match v {
        weftend_receipt::ExecutionVerdict::Allow => "ALLOW",
        weftend_receipt::ExecutionVerdict::Deny => "DENY",
        weftend_receipt::ExecutionVerdict::Skip => "SKIP",
        weftend_receipt::ExecutionVerdict::NotAttempted => "NOT_ATTEMPTED",
    }
}

fn privacy_str(v: PrivacyLintVerdict) -> &'static str {
    match v {
        PrivacyLintVerdict::Pass => "PASS",
        PrivacyLintVerdict::Fail => "FAIL",
    }
}

fn run_compare(args: CompareArgs) -> Result<ExitCode, WeftEndError> {
    let root = library_root(args.library_root)?;
    let left = weftend_library::load_run_receipt(&root, &args.target_key, &args.left_run_id)?;
    let right = weftend_library::load_run_receipt(&root, &args.target_key, &args.right_run_id)?;

    let reason_codes: Vec<String> = left
        .reason_codes
        .iter()
        .chain(right.reason_codes.iter())
        .cloned()
        .collect();
    let outcome = weftend_library::compare_run_receipts(&left, &right);
    let receipt = weftend_library::build_compare_receipt(
        left.artifact_digest.clone(),
        vec![left.artifact_kind.clone()],
        right.artifact_digest.clone(),
        vec![right.artifact_kind.clone()],
        outcome,
        PrivacyLintVerdict::Pass,
        reason_codes,
    )
    .map_err(|e| WeftEndError::Internal(format!("compare receipt digest failed: {e}")))?;

    let body = weftend_util::canon::canonical_string(&receipt)
        .map_err(|e| WeftEndError::Internal(format!("failed to canonicalize compare receipt: {e}")))?;
    println!("{body}");
    Ok(ExitCode::SUCCESS)
}

fn run_shadow_audit(args: ShadowAuditArgs) -> Result<ExitCode, WeftEndError> {
    let content = std::fs::read_to_string(&args.events).map_err(|e| {
        WeftEndError::input("INPUT_MISSING", format!("failed to read events file: {e}"))
    })?;
    let events: Vec<serde_json::Value> = serde_json::from_str(&content).map_err(|e| {
        WeftEndError::input("INPUT_INVALID", format!("events file is not a JSON array: {e}"))
    })?;

    let policy_path = args.policy.map(utf8_path).transpose()?;
    let deny_thresholds = match &policy_path {
        Some(path) => weftend_policy::load_policy(Some(path))?
            .policy
            .deny_thresholds
            .map(|t| t.by_family)
            .unwrap_or_default(),
        None => Default::default(),
    };

    let request = weftend_shadow_audit::ShadowAuditRequest { deny_thresholds, events };
    let result = weftend_shadow_audit::run_shadow_audit(&request);
    let status = result.status;
    let body = weftend_util::canon::canonical_string(&result)
        .map_err(|e| WeftEndError::Internal(format!("failed to canonicalize shadow-audit result: {e}")))?;
    println!("{body}");
    Ok(match status {
        weftend_receipt::ShadowAuditStatus::Deny => ExitCode::FAIL_CLOSED,
        weftend_receipt::ShadowAuditStatus::Warn | weftend_receipt::ShadowAuditStatus::Ok => ExitCode::SUCCESS,
    })
}

fn run_library_action(action: LibraryAction) -> Result<ExitCode, WeftEndError> {
    let (target_key, state) = match action {
        LibraryAction::AcceptBaseline { target_key, library_root: lr } => {
            let root = library_root(lr)?;
            let state = weftend_library::accept_baseline(&root, &target_key)?;
            (target_key, state)
        }
        LibraryAction::RejectBaseline { target_key, library_root: lr } => {
            let root = library_root(lr)?;
            let state = weftend_library::reject_baseline(&root, &target_key)?;
            (target_key, state)
        }
    };
    let body = weftend_util::canon::canonical_string(&state)
        .map_err(|e| WeftEndError::Internal(format!("failed to canonicalize view state for {target_key}: {e}")))?;
    println!("{body}");
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_subcommand_is_input_invalid() {
        let code = run(["weftend", "bogus-command"]);
        assert_eq!(code, ExitCode::FAIL_CLOSED);
    }

    #[test]
    fn missing_required_out_flag_is_input_invalid() {
        let code = run(["weftend", "safe-run", "input.txt"]);
        assert_eq!(code, ExitCode::FAIL_CLOSED);
    }

    #[test]
    fn execute_and_withhold_exec_conflict_is_input_invalid() {
        let code = run([
            "weftend", "safe-run", "input.txt", "--out", "out", "--execute", "--withhold-exec",
        ]);
        assert_eq!(code, ExitCode::FAIL_CLOSED);
    }

    #[test]
    fn unknown_adapter_selection_is_input_invalid() {
        assert!(parse_adapter_selection("not-a-class").is_err());
        assert!(matches!(parse_adapter_selection("auto"), Ok(AdapterSelection::Auto)));
        assert!(matches!(parse_adapter_selection("none"), Ok(AdapterSelection::None)));
    }

    #[test]
    fn safe_run_happy_path_exits_success() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = camino::Utf8PathBuf::from_path_buf(dir.path().join("a.txt")).unwrap();
        std::fs::write(&input, b"hello").unwrap();
        let out = camino::Utf8PathBuf::from_path_buf(dir.path().join("out")).unwrap();
        let library_root = dir.path().join("Library");
        std::env::set_var("WEFTEND_LIBRARY_ROOT", &library_root);
        let code = run(["weftend", "safe-run", input.as_str(), "--out", out.as_str()]);
        std::env::remove_var("WEFTEND_LIBRARY_ROOT");
        assert_eq!(code, ExitCode::SUCCESS);
    }
}
