//! decides which lines make it onto a screen of a given size.
//!
//! lines are plain text; colors are the renderer's business.

use crate::process::Process;

/// screens shorter than this have no room for the launch section.
pub const LAUNCH_SECTION_MIN_ROWS: usize = 20;

/// how many launch lines the launch section shows.
pub const LAUNCH_LINES: usize = 5;

pub const LAUNCH_TITLE: &str = "Launched binaries, most launched first:";

const HEADINGS: [&str; 6] = ["PID", "COMMAND", "USERNAME", "CPU", "RAM", "COMMANDLINE"];

/// lays out one screenful of top mode, returning exactly `rows` lines.
///
/// `processes` must be ordered with the most interesting process last. if they don't all
/// fit, the least interesting are left out, and the ones shown are listed most interesting
/// first.
pub fn get_screen_lines(
    header: &str,
    launch_lines: &[String],
    processes: &[Process],
    rows: usize,
    columns: usize,
) -> Vec<String> {
    let mut lines = Vec::with_capacity(rows);
    if rows == 0 {
        return lines;
    }

    lines.push(crop(header, columns));

    if rows >= LAUNCH_SECTION_MIN_ROWS {
        lines.push(crop(LAUNCH_TITLE, columns));
        let launches = launch_lines
            .iter()
            .map(|line| crop(&format!("  {line}"), columns))
            .chain(std::iter::repeat(String::new()))
            .take(LAUNCH_LINES);
        lines.extend(launches);
        lines.push(String::new());
    }

    // one row goes to the table heading.
    let room = rows - lines.len();
    let shown = room.saturating_sub(1).min(processes.len());
    let best_first = processes[processes.len() - shown..].iter().rev();
    lines.extend(to_screen_lines(best_first, Some(columns)).into_iter().take(room));

    lines.resize(rows, String::new());
    lines
}

/// formats processes as a table with a heading, cropping lines to `columns` if given.
pub fn to_screen_lines<'a>(
    processes: impl IntoIterator<Item = &'a Process>,
    columns: Option<usize>,
) -> Vec<String> {
    let cells = processes
        .into_iter()
        .map(|p| {
            [
                p.pid().to_string(),
                p.command().to_string(),
                p.username().to_string(),
                p.cpu_time_s().to_string(),
                p.memory_percent_s().to_string(),
                p.cmdline().to_string(),
            ]
        })
        .collect::<Vec<_>>();

    let mut widths = HEADINGS.map(|heading| heading.chars().count());
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let headings = HEADINGS.map(str::to_string);
    std::iter::once(&headings)
        .chain(&cells)
        .map(|[pid, command, username, cpu, ram, cmdline]| {
            let [w_pid, w_command, w_username, w_cpu, w_ram, _] = widths;
            let line = format!(
                "{pid:>w_pid$} {command:<w_command$} {username:<w_username$} {cpu:>w_cpu$} {ram:>w_ram$} {cmdline}"
            );
            match columns {
                Some(columns) => crop(&line, columns),
                None => line,
            }
        })
        .collect()
}

fn crop(line: &str, columns: usize) -> String {
    line.chars().take(columns).collect()
}
