use stockpulse_core::{QueryTool, Symbol, Warehouse};

use crate::cli::{QueryArgs, QueryCommand};
use crate::error::CliError;

use super::CommandResult;

pub fn run(args: &QueryArgs, warehouse: Warehouse) -> Result<CommandResult, CliError> {
    let tool = QueryTool::new(warehouse);

    match &args.command {
        QueryCommand::Gainers(ranking) => {
            CommandResult::ok(tool.top_gainers(ranking.date, positive_limit(ranking.limit)?)?)
        }
        QueryCommand::Losers(ranking) => {
            CommandResult::ok(tool.top_losers(ranking.date, positive_limit(ranking.limit)?)?)
        }
        QueryCommand::Movers {
            min_percent,
            start,
            end,
            weekly,
        } => {
            if *weekly {
                CommandResult::ok(tool.weekly_movers(*min_percent, *start, *end)?)
            } else {
                CommandResult::ok(tool.daily_movers(*min_percent, *start, *end)?)
            }
        }
        QueryCommand::History { symbol, start, end } => {
            let symbol = Symbol::parse(symbol)?;
            CommandResult::ok(tool.price_history(&symbol, *start, *end)?)
        }
        QueryCommand::Movement {
            start,
            end,
            min_percent,
        } => CommandResult::ok(tool.stocks_by_movement(*start, *end, *min_percent)?),
        QueryCommand::Volatile { days, limit } => {
            CommandResult::ok(tool.most_volatile(*days, positive_limit(*limit)?)?)
        }
        QueryCommand::Search { ticker, name } => {
            CommandResult::ok(tool.search(ticker.as_deref(), name.as_deref())?)
        }
    }
}

fn positive_limit(limit: usize) -> Result<usize, CliError> {
    if limit == 0 {
        return Err(CliError::Command(String::from(
            "--limit must be greater than zero",
        )));
    }
    Ok(limit)
}
