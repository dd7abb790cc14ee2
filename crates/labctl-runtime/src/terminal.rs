use std::io::{stderr, IsTerminal};

pub fn print_enter_banner(container: &str, shell: &str) {
    if is_interactive_terminal() {
        eprintln!("{}", enter_banner(container, shell));
    }
}

fn enter_banner(container: &str, shell: &str) -> String {
    format!("\x1b[1;36m[labctl]\x1b[0m entering \x1b[1m{container}\x1b[0m in a {shell} session")
}

pub fn print_exit_banner(container: &str) {
    if is_interactive_terminal() {
        eprintln!("\x1b[1;36m[labctl]\x1b[0m left {container}");
    }
}

fn is_interactive_terminal() -> bool {
    stderr().is_terminal()
}
