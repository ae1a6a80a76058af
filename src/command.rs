//! short display names for raw command lines.

/// turns a raw command line into a short name for display.
///
/// implementations must not fail; when nothing better can be said the raw text is returned.
pub trait CommandNamer {
    fn command_name(&self, cmdline: &str) -> String;
}

impl<F> CommandNamer for F
where
    F: Fn(&str) -> String,
{
    fn command_name(&self, cmdline: &str) -> String {
        self(cmdline)
    }
}

/// the default naming heuristic, see [`command_name`].
#[derive(Clone, Copy, Debug, Default)]
pub struct Heuristic;

impl CommandNamer for Heuristic {
    fn command_name(&self, cmdline: &str) -> String {
        command_name(cmdline)
    }
}

const SCRIPT_INTERPRETERS: [&str; 6] = ["ruby", "sh", "bash", "perl", "node", "zsh"];

/// java switches that consume the following word.
const JAVA_SWITCHES_WITH_VALUE: [&str; 5] =
    ["-cp", "-classpath", "--add-opens", "--add-exports", "--add-reads"];

pub fn command_name(cmdline: &str) -> String {
    let trimmed = cmdline.trim();
    if trimmed.starts_with('[') {
        // kernel threads, "[kworker/0:1]"
        return trimmed.to_string();
    }

    let mut words = trimmed.split_whitespace();
    let Some(argv0) = words.next() else {
        return cmdline.to_string();
    };
    let command = basename(argv0);
    let args = words.collect::<Vec<_>>();

    if command.to_lowercase().starts_with("python") {
        return python(command, &args);
    }
    if command == "java" {
        return java(&args);
    }
    if command == "sudo" {
        return sudo(&args);
    }
    if SCRIPT_INTERPRETERS.contains(&command) {
        return match args.first() {
            Some(script) if !script.starts_with('-') => basename(script).to_string(),
            _ => command.to_string(),
        };
    }

    command.to_string()
}

fn basename(path: &str) -> &str {
    path.rsplit('/').find(|s| !s.is_empty()).unwrap_or(path)
}

fn python(command: &str, args: &[&str]) -> String {
    let mut args = args.iter();
    while let Some(arg) = args.next() {
        match *arg {
            "-m" => {
                return match args.next() {
                    Some(module) if !module.starts_with('-') => module.to_string(),
                    _ => command.to_string(),
                };
            }
            // inline programs have no name, and -W is not worth parsing
            "-c" | "-W" => return command.to_string(),
            switch if switch.starts_with('-') => continue,
            script => return basename(script).to_string(),
        }
    }
    command.to_string()
}

fn java(args: &[&str]) -> String {
    let mut args = args.iter();
    while let Some(arg) = args.next() {
        match *arg {
            "-jar" => {
                return match args.next() {
                    Some(jar) => basename(jar).to_string(),
                    None => "java".to_string(),
                };
            }
            switch if JAVA_SWITCHES_WITH_VALUE.contains(&switch) => {
                if args.next().is_none() {
                    return "java".to_string();
                }
            }
            switch if switch.starts_with('-') => continue,
            class => return java_class_name(class),
        }
    }
    "java".to_string()
}

fn java_class_name(class: &str) -> String {
    let mut segments = class.rsplit('.');
    let last = segments.next().unwrap_or(class);
    match (last, segments.next()) {
        ("Main", Some(package)) => format!("{package}.Main"),
        _ => last.to_string(),
    }
}

fn sudo(args: &[&str]) -> String {
    match args.first() {
        None => "sudo".to_string(),
        Some(arg) if arg.starts_with('-') => "sudo".to_string(),
        Some(_) => format!("sudo {}", command_name(&args.join(" "))),
    }
}
