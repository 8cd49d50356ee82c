use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::format_deadline;
use crate::model::TaskList;
use crate::views::DeadlineStatus;

pub const EMPTY_LISTS_PLACEHOLDER: &str = "No task lists yet.";
pub const EMPTY_TIMELINE_PLACEHOLDER: &str = "No deadlines set yet.";
pub const EMPTY_TASKS_PLACEHOLDER: &str = "No tasks yet. Add your first one above.";

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    #[tracing::instrument(skip(self, lists, now))]
    pub fn print_lists(
        &mut self,
        lists: &[&TaskList],
        active_id: Option<uuid::Uuid>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        self.write_lists(&mut out, lists, active_id, now)
    }

    pub fn write_lists<W: Write>(
        &self,
        mut writer: W,
        lists: &[&TaskList],
        active_id: Option<uuid::Uuid>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        if lists.is_empty() {
            writeln!(writer, "{EMPTY_LISTS_PLACEHOLDER}")?;
            return Ok(());
        }

        let headers = vec![
            String::new(),
            "Title".to_string(),
            "Deadline".to_string(),
            "Tasks".to_string(),
            "Created".to_string(),
        ];

        let mut rows = Vec::with_capacity(lists.len());
        for list in lists {
            let marker = if active_id == Some(list.id) { "*" } else { "" };
            let status = DeadlineStatus::of(list.deadline_at, now);
            let deadline = if status.is_overdue() {
                self.paint(&status.label(), "31")
            } else {
                status.label()
            };

            rows.push(vec![
                marker.to_string(),
                list.title.clone(),
                deadline,
                list.tasks.len().to_string(),
                format_deadline(list.created_at),
            ]);
        }

        write_table(&mut writer, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, items, now))]
    pub fn print_timeline(&mut self, items: &[&TaskList], now: DateTime<Utc>) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        self.write_timeline(&mut out, items, now)
    }

    pub fn write_timeline<W: Write>(
        &self,
        mut writer: W,
        items: &[&TaskList],
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        if items.is_empty() {
            writeln!(writer, "{EMPTY_TIMELINE_PLACEHOLDER}")?;
            return Ok(());
        }

        for list in items {
            let status = DeadlineStatus::of(list.deadline_at, now);
            let label = if status.is_overdue() {
                self.paint(&status.label(), "31")
            } else {
                status.label()
            };
            writeln!(writer, "{}  {}", list.title, label)?;
        }

        Ok(())
    }

    #[tracing::instrument(skip(self, list, now))]
    pub fn print_tasks(&mut self, list: &TaskList, now: DateTime<Utc>) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        self.write_tasks(&mut out, list, now)
    }

    pub fn write_tasks<W: Write>(
        &self,
        mut writer: W,
        list: &TaskList,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let status = DeadlineStatus::of(list.deadline_at, now);
        let label = if status.is_overdue() {
            self.paint(&status.label(), "31")
        } else {
            status.label()
        };
        writeln!(writer, "{} ({} tasks)  {}", list.title, list.tasks.len(), label)?;

        if list.tasks.is_empty() {
            writeln!(writer, "{EMPTY_TASKS_PLACEHOLDER}")?;
            return Ok(());
        }

        for (idx, task) in list.tasks.iter().enumerate() {
            let mark = if task.completed { "x" } else { " " };
            let text = if task.completed {
                self.paint(&task.text, "2")
            } else {
                task.text.clone()
            };
            writeln!(writer, "{:>3} [{mark}] {text}", idx + 1)?;
        }

        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{EMPTY_TASKS_PLACEHOLDER, EMPTY_TIMELINE_PLACEHOLDER, Renderer, strip_ansi};
    use crate::config::Config;
    use crate::model::TaskList;

    fn plain_renderer() -> Renderer {
        let mut cfg = Config::load(Some(std::path::Path::new("/dev/null"))).expect("config");
        cfg.apply_overrides([("color".to_string(), "off".to_string())]);
        Renderer::new(&cfg).expect("renderer")
    }

    #[test]
    fn empty_task_list_renders_the_placeholder() {
        let now = Utc
            .with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
            .single()
            .expect("valid now");
        let mut list = TaskList::new("Errands".to_string(), None, now);
        list.tasks.clear();

        let mut out = Vec::new();
        plain_renderer()
            .write_tasks(&mut out, &list, now)
            .expect("render tasks");
        let rendered = String::from_utf8(out).expect("utf8");
        assert!(rendered.contains(EMPTY_TASKS_PLACEHOLDER));
    }

    #[test]
    fn empty_timeline_renders_the_placeholder() {
        let now = Utc
            .with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
            .single()
            .expect("valid now");
        let mut out = Vec::new();
        plain_renderer()
            .write_timeline(&mut out, &[], now)
            .expect("render timeline");
        let rendered = String::from_utf8(out).expect("utf8");
        assert!(rendered.contains(EMPTY_TIMELINE_PLACEHOLDER));
    }

    #[test]
    fn strip_ansi_removes_color_codes() {
        assert_eq!(strip_ansi("\x1b[31moverdue\x1b[0m"), "overdue");
        assert_eq!(strip_ansi("plain"), "plain");
    }
}
