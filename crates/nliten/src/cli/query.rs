//! `query` subcommand — call API endpoints and dump the replies as JSON.

use nliten_lib::api::QueryWindow;
use serde_json::{Map, Value};

use super::{ApiCommand, Context, NlitenError, Result, print_json, time};

/// Turn the `-b/-e/-d` strings into a checked query window.
pub(super) fn build_window(
    begin: Option<&str>,
    end: Option<&str>,
    date: Option<&str>,
) -> Result<QueryWindow> {
    let start_at = begin.map(time::parse_local_time).transpose()?;
    let end_at = end.map(time::parse_local_time).transpose()?;
    time::check_window(start_at, end_at)?;
    let read_at = date.map(time::parse_local_time).transpose()?;
    let summary_date = read_at.map(time::summary_date).transpose()?;
    Ok(QueryWindow {
        start_at,
        end_at,
        read_at,
        summary_date,
    })
}

pub(super) fn cmd_query(
    ctx: &Context,
    commands: &[ApiCommand],
    begin: Option<&str>,
    end: Option<&str>,
    date: Option<&str>,
) -> Result<()> {
    let window = build_window(begin, end, date)?;
    if ctx.verbose > 0 {
        eprintln!("[query] {window:?}");
    }

    let mut client = ctx.connect()?;

    let mut seen = Vec::new();
    let mut results = Map::new();
    let mut first_error = None;
    for &cmd in commands {
        if seen.contains(&cmd) {
            continue;
        }
        seen.push(cmd);
        // `connect` already fetched the systems list
        let reply = if cmd == ApiCommand::Systems {
            Ok(client.all_systems().clone())
        } else {
            client.run(cmd, &window)
        };
        match reply {
            Ok(value) => {
                results.insert(cmd.name().into(), value);
            }
            Err(e) => {
                log::error!("{cmd} failed: {e}");
                results.insert(cmd.name().into(), Value::Null);
                first_error.get_or_insert(e);
            }
        }
    }

    print_json(&Value::Object(results))?;
    match first_error {
        Some(e) => Err(NlitenError::Api(e)),
        None => Ok(()),
    }
}
