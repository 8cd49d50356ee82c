use anyhow::anyhow;
use chrono::{DateTime, Utc};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::auth::{LocalDirectoryProvider, Session};
use crate::board::TaskBoard;
use crate::cli::Invocation;
use crate::datetime::{format_deadline, parse_date_expr};
use crate::model::{TaskList, ThemePreference};
use crate::render::Renderer;
use crate::store::TaskStore;
use crate::views::{recency_view, timeline_view};

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "signup", "login", "logout", "whoami", "lists", "timeline", "tasks", "new", "rename",
        "due", "drop", "select", "add", "toggle", "remove", "theme", "help", "version",
    ]
}

/// Expands a unique command prefix to its full name. Exact matches win over
/// prefix matches so a command can never be shadowed by a longer one.
pub fn expand_command_abbrev<'a>(token: &str, known: &[&'a str]) -> Option<&'a str> {
    if let Some(exact) = known.iter().copied().find(|name| *name == token) {
        return Some(exact);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[instrument(skip(store, renderer, inv))]
pub fn dispatch(store: &TaskStore, renderer: &mut Renderer, inv: Invocation) -> anyhow::Result<()> {
    let now = Utc::now();
    let args = inv.command_args;
    debug!(command = %inv.command, args = ?args, "dispatching command");

    match inv.command.as_str() {
        "signup" => cmd_signup(store, &args),
        "login" => cmd_login(store, &args),
        "logout" => cmd_logout(store),
        "whoami" => cmd_whoami(store),
        "lists" => cmd_lists(store, renderer, now),
        "timeline" => cmd_timeline(store, renderer, now),
        "tasks" => cmd_tasks(store, renderer, now),
        "new" => cmd_new(store, &args, now),
        "rename" => cmd_rename(store, &args, now),
        "due" => cmd_due(store, &args, now),
        "drop" => cmd_drop(store, &args, now),
        "select" => cmd_select(store, &args, now),
        "add" => cmd_add(store, &args, now),
        "toggle" => cmd_toggle(store, &args, now),
        "remove" => cmd_remove(store, &args, now),
        "theme" => cmd_theme(store, &args),
        "help" => cmd_help(),
        "version" => {
            println!("dayline {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

fn open_session(store: &TaskStore) -> anyhow::Result<Session<LocalDirectoryProvider>> {
    let provider = LocalDirectoryProvider::open(&store.data_dir)?;
    let resumed = match store.current_user_id()? {
        Some(user_id) => provider.lookup(&user_id).map_err(anyhow::Error::new)?,
        None => None,
    };

    let mut session = Session::new(provider);
    if let Some(identity) = resumed {
        session.resume(identity);
    }
    Ok(session)
}

fn require_user(store: &TaskStore) -> anyhow::Result<String> {
    store
        .current_user_id()?
        .ok_or_else(|| anyhow!("not signed in; run `dayline login` or `dayline signup` first"))
}

fn cmd_signup(store: &TaskStore, args: &[String]) -> anyhow::Result<()> {
    let [identifier, password, rest @ ..] = args else {
        return Err(anyhow!("usage: dayline signup <email|username> <password> [display name]"));
    };
    let display = rest.join(" ");
    let display = (!display.trim().is_empty()).then_some(display.as_str());

    let provider = LocalDirectoryProvider::open(&store.data_dir)?;
    let mut session = Session::new(provider);
    let identity = session
        .sign_up_with_credentials(identifier, password, display)
        .map_err(anyhow::Error::new)?
        .clone();

    store.set_current_user_id(Some(&identity.id))?;
    store.set_active_selection(None)?;
    println!("Account created. Signed in as {}.", identity.label());
    Ok(())
}

fn cmd_login(store: &TaskStore, args: &[String]) -> anyhow::Result<()> {
    let [identifier, password] = args else {
        return Err(anyhow!("usage: dayline login <email|username> <password>"));
    };

    let provider = LocalDirectoryProvider::open(&store.data_dir)?;
    let mut session = Session::new(provider);
    let identity = session
        .sign_in_with_credentials(identifier, password)
        .map_err(anyhow::Error::new)?
        .clone();

    store.set_current_user_id(Some(&identity.id))?;
    store.set_active_selection(None)?;
    println!("Signed in as {}.", identity.label());
    Ok(())
}

fn cmd_logout(store: &TaskStore) -> anyhow::Result<()> {
    let mut session = open_session(store)?;
    if session.current_user().is_none() {
        println!("Not signed in.");
        return Ok(());
    }

    session.sign_out();
    store.set_current_user_id(None)?;
    store.set_active_selection(None)?;
    println!("Signed out.");
    Ok(())
}

fn cmd_whoami(store: &TaskStore) -> anyhow::Result<()> {
    let session = open_session(store)?;
    match session.current_user() {
        Some(identity) => {
            match identity.email.as_deref() {
                Some(email) if email != identity.label() => {
                    println!("{} <{email}>", identity.label());
                }
                _ => println!("{}", identity.label()),
            }
            Ok(())
        }
        None => {
            // A session marker without a matching account record also lands
            // here, which is the honest answer.
            println!("Not signed in.");
            Ok(())
        }
    }
}

fn cmd_lists(store: &TaskStore, renderer: &mut Renderer, now: DateTime<Utc>) -> anyhow::Result<()> {
    let user_id = require_user(store)?;
    let board = TaskBoard::load(store, &user_id, now);
    let sorted = recency_view(board.lists());
    let active_id = board.active_list().map(|list| list.id);
    renderer.print_lists(&sorted, active_id, now)
}

fn cmd_timeline(
    store: &TaskStore,
    renderer: &mut Renderer,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let user_id = require_user(store)?;
    let board = TaskBoard::load(store, &user_id, now);
    let upcoming = timeline_view(board.lists());
    renderer.print_timeline(&upcoming, now)
}

fn cmd_tasks(store: &TaskStore, renderer: &mut Renderer, now: DateTime<Utc>) -> anyhow::Result<()> {
    let user_id = require_user(store)?;
    let board = TaskBoard::load(store, &user_id, now);
    match board.active_list() {
        Some(list) => renderer.print_tasks(list, now),
        None => {
            println!("No task lists yet. Create one with `dayline new <title>`.");
            Ok(())
        }
    }
}

fn cmd_new(store: &TaskStore, args: &[String], now: DateTime<Utc>) -> anyhow::Result<()> {
    let user_id = require_user(store)?;
    let (title, deadline) = split_title_and_due(args, now)?;

    let mut board = TaskBoard::load(store, &user_id, now);
    match board.create_list(&title, deadline, now)? {
        Some(_) => {
            println!("Created list '{}'.", title.trim());
            Ok(())
        }
        None => {
            println!("List title cannot be empty.");
            Ok(())
        }
    }
}

fn cmd_rename(store: &TaskStore, args: &[String], now: DateTime<Utc>) -> anyhow::Result<()> {
    let user_id = require_user(store)?;
    let [reference, title @ ..] = args else {
        return Err(anyhow!("usage: dayline rename <list> <new title>"));
    };
    if title.is_empty() {
        return Err(anyhow!("usage: dayline rename <list> <new title>"));
    }

    let mut board = TaskBoard::load(store, &user_id, now);
    let Some(list_id) = resolve_list_id(board.lists(), reference) else {
        println!("No matching list.");
        return Ok(());
    };

    board.rename_list(list_id, &title.join(" "), now)?;
    println!("Renamed list.");
    Ok(())
}

fn cmd_due(store: &TaskStore, args: &[String], now: DateTime<Utc>) -> anyhow::Result<()> {
    let user_id = require_user(store)?;
    let [reference, expr] = args else {
        return Err(anyhow!("usage: dayline due <list> <when|none>"));
    };

    let deadline = if expr.eq_ignore_ascii_case("none") {
        None
    } else {
        Some(parse_date_expr(expr, now)?)
    };

    let mut board = TaskBoard::load(store, &user_id, now);
    let Some(list_id) = resolve_list_id(board.lists(), reference) else {
        println!("No matching list.");
        return Ok(());
    };

    board.set_list_deadline(list_id, deadline, now)?;
    match deadline {
        Some(at) => println!("Deadline set: {}.", format_deadline(at)),
        None => println!("Cleared deadline."),
    }
    Ok(())
}

fn cmd_drop(store: &TaskStore, args: &[String], now: DateTime<Utc>) -> anyhow::Result<()> {
    let user_id = require_user(store)?;
    let [reference] = args else {
        return Err(anyhow!("usage: dayline drop <list>"));
    };

    let mut board = TaskBoard::load(store, &user_id, now);
    let Some(list_id) = resolve_list_id(board.lists(), reference) else {
        println!("No matching list.");
        return Ok(());
    };

    board.delete_list(list_id)?;
    println!("Deleted list.");
    Ok(())
}

fn cmd_select(store: &TaskStore, args: &[String], now: DateTime<Utc>) -> anyhow::Result<()> {
    let user_id = require_user(store)?;
    let [reference] = args else {
        return Err(anyhow!("usage: dayline select <list>"));
    };

    let mut board = TaskBoard::load(store, &user_id, now);
    let Some(list_id) = resolve_list_id(board.lists(), reference) else {
        println!("No matching list.");
        return Ok(());
    };

    board.select_list(list_id)?;
    let title = board
        .active_list()
        .map(|list| list.title.clone())
        .unwrap_or_default();
    println!("Selected '{title}'.");
    Ok(())
}

fn cmd_add(store: &TaskStore, args: &[String], now: DateTime<Utc>) -> anyhow::Result<()> {
    let user_id = require_user(store)?;
    let mut board = TaskBoard::load(store, &user_id, now);
    let Some(active_id) = board.active_list().map(|list| list.id) else {
        println!("No task lists yet. Create one with `dayline new <title>`.");
        return Ok(());
    };

    let text = args.join(" ");
    match board.add_task(active_id, &text, now)? {
        Some(_) => println!("Added task."),
        None => println!("Task text cannot be empty."),
    }
    Ok(())
}

fn cmd_toggle(store: &TaskStore, args: &[String], now: DateTime<Utc>) -> anyhow::Result<()> {
    let user_id = require_user(store)?;
    let [reference] = args else {
        return Err(anyhow!("usage: dayline toggle <task>"));
    };

    let mut board = TaskBoard::load(store, &user_id, now);
    let Some(task_id) = resolve_task_id(&board, reference) else {
        println!("No matching task.");
        return Ok(());
    };

    board.toggle_task(task_id, now)?;
    println!("Toggled task.");
    Ok(())
}

fn cmd_remove(store: &TaskStore, args: &[String], now: DateTime<Utc>) -> anyhow::Result<()> {
    let user_id = require_user(store)?;
    let [reference] = args else {
        return Err(anyhow!("usage: dayline remove <task>"));
    };

    let mut board = TaskBoard::load(store, &user_id, now);
    let Some(task_id) = resolve_task_id(&board, reference) else {
        println!("No matching task.");
        return Ok(());
    };

    board.delete_task(task_id, now)?;
    println!("Removed task.");
    Ok(())
}

fn cmd_theme(store: &TaskStore, args: &[String]) -> anyhow::Result<()> {
    match args {
        [] => {
            println!("{}", store.load_theme().as_str());
            Ok(())
        }
        [value] => {
            let pref = ThemePreference::parse(value)
                .ok_or_else(|| anyhow!("invalid theme: {value} (expected light or dark)"))?;
            store.save_theme(pref)?;
            println!("Theme set to {}.", pref.as_str());
            Ok(())
        }
        _ => Err(anyhow!("usage: dayline theme [light|dark]")),
    }
}

fn cmd_help() -> anyhow::Result<()> {
    println!("dayline: personal task-list planner");
    println!();
    println!("  signup <id> <password> [name]   create an account and sign in");
    println!("  login <id> <password>           sign in");
    println!("  logout                          sign out");
    println!("  whoami                          show the signed-in account");
    println!();
    println!("  lists                           task lists, most recently updated first");
    println!("  timeline                        upcoming deadlines, soonest first");
    println!("  tasks                           tasks in the active list");
    println!();
    println!("  new <title> [due:<when>]        create a list (and make it active)");
    println!("  rename <list> <new title>       rename a list");
    println!("  due <list> <when|none>          set or clear a list deadline");
    println!("  drop <list>                     delete a list");
    println!("  select <list>                   change the active list");
    println!();
    println!("  add <text>                      add a task to the active list");
    println!("  toggle <task>                   flip a task's completed state");
    println!("  remove <task>                   delete a task");
    println!();
    println!("  theme [light|dark]              show or set the theme preference");
    println!("  version                         print the version");
    println!();
    println!("Lists match by title, title prefix, or id prefix; tasks by index in");
    println!("the active list or id prefix. <when> accepts now, today, tomorrow,");
    println!("+3d / -2h / +45m offsets, 2026-05-01, or 2026-05-01T09:00.");
    Ok(())
}

/// Splits `new` arguments into a title and an optional `due:<expr>` deadline.
/// The expression may not contain spaces; use the `T` datetime form instead.
fn split_title_and_due(
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<(String, Option<DateTime<Utc>>)> {
    let mut words = Vec::with_capacity(args.len());
    let mut deadline = None;

    for arg in args {
        if let Some(expr) = arg.strip_prefix("due:") {
            deadline = Some(parse_date_expr(expr, now)?);
        } else {
            words.push(arg.as_str());
        }
    }

    Ok((words.join(" "), deadline))
}

/// Resolves a list reference: exact title (case-insensitive), then unique
/// title prefix, then unique id prefix.
fn resolve_list_id(lists: &[TaskList], reference: &str) -> Option<Uuid> {
    let needle = reference.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }

    if let Some(list) = single(lists.iter().filter(|list| list.title.to_lowercase() == needle)) {
        return Some(list.id);
    }
    if let Some(list) = single(
        lists
            .iter()
            .filter(|list| list.title.to_lowercase().starts_with(&needle)),
    ) {
        return Some(list.id);
    }
    single(
        lists
            .iter()
            .filter(|list| list.id.to_string().starts_with(&needle)),
    )
    .map(|list| list.id)
}

/// Resolves a task reference: a 1-based index into the active list, else a
/// unique id prefix across all lists.
fn resolve_task_id(board: &TaskBoard<'_>, reference: &str) -> Option<Uuid> {
    if let Ok(index) = reference.parse::<usize>() {
        let active = board.active_list()?;
        return active
            .tasks
            .get(index.checked_sub(1)?)
            .map(|task| task.id);
    }

    let needle = reference.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }
    single(
        board
            .lists()
            .iter()
            .flat_map(|list| &list.tasks)
            .filter(|task| task.id.to_string().starts_with(&needle)),
    )
    .map(|task| task.id)
}

fn single<T>(mut iter: impl Iterator<Item = T>) -> Option<T> {
    let first = iter.next()?;
    if iter.next().is_some() { None } else { Some(first) }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{expand_command_abbrev, known_command_names, resolve_list_id, split_title_and_due};
    use crate::model::TaskList;

    #[test]
    fn abbreviations_expand_only_when_unique() {
        let known = known_command_names();
        assert_eq!(expand_command_abbrev("time", &known), Some("timeline"));
        assert_eq!(expand_command_abbrev("logi", &known), Some("login"));
        assert_eq!(expand_command_abbrev("logo", &known), Some("logout"));
        // "log" matches login and logout; "t" matches even more.
        assert_eq!(expand_command_abbrev("log", &known), None);
        assert_eq!(expand_command_abbrev("t", &known), None);
        assert_eq!(expand_command_abbrev("nonsense", &known), None);
    }

    #[test]
    fn exact_command_wins_over_a_longer_prefix_match() {
        let known = vec!["login", "logout"];
        assert_eq!(expand_command_abbrev("login", &known), Some("login"));
    }

    #[test]
    fn due_token_is_lifted_out_of_the_title() {
        let now = Utc
            .with_ymd_and_hms(2026, 4, 1, 8, 0, 0)
            .single()
            .expect("valid now");
        let args = vec![
            "Ship".to_string(),
            "the".to_string(),
            "release".to_string(),
            "due:+2d".to_string(),
        ];

        let (title, deadline) = split_title_and_due(&args, now).expect("parse args");
        assert_eq!(title, "Ship the release");
        assert_eq!(deadline, Some(now + Duration::days(2)));
    }

    #[test]
    fn list_references_match_title_then_prefix_then_id() {
        let now = Utc
            .with_ymd_and_hms(2026, 4, 1, 8, 0, 0)
            .single()
            .expect("valid now");
        let lists = vec![
            TaskList::new("Groceries".to_string(), None, now),
            TaskList::new("Growth plan".to_string(), None, now),
        ];

        assert_eq!(resolve_list_id(&lists, "groceries"), Some(lists[0].id));
        assert_eq!(resolve_list_id(&lists, "groc"), Some(lists[0].id));
        // Ambiguous prefix across both titles.
        assert_eq!(resolve_list_id(&lists, "gro"), None);

        let id_prefix = &lists[1].id.to_string()[..8];
        assert_eq!(resolve_list_id(&lists, id_prefix), Some(lists[1].id));
        assert_eq!(resolve_list_id(&lists, "  "), None);
    }
}
