//! `weftend` CLI binary. All logic lives in `weftend-cli`; this entrypoint
//! only maps its exit code to the process exit status.

fn main() {
    let code = weftend_cli::run(std::env::args_os());
    std::process::exit(code.as_i32());
}
