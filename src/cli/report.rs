use std::fmt::Display;

use anyhow::Result;
use chrono::{DateTime, Local, NaiveDate};
use chrono_english::parse_date_string;
use clap::{CommandFactory, Parser, ValueEnum};
use now::DateTimeNow;

use crate::{
    host::storage::{
        entities::{DayBucket, ScreenTimeStore},
        kv_store::{JsonFileStore, KeyValueStore, SCREEN_TIME_KEY},
    },
    utils::{
        dir::create_application_default_path,
        percentage::{seconds_percentage, Percentage},
        time::{date_key, format_seconds, next_day_start},
    },
};

use super::Args;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

#[derive(Debug, Parser)]
pub struct ReportCommand {
    #[arg(
        long = "start",
        short,
        help = "Start of the range. Examples are \"yesterday\", \"1 week ago\", \"15/03/2025\""
    )]
    start_date: Option<String>,
    #[arg(
        long = "end",
        short,
        help = "End of the range. Examples are \"yesterday\", \"15/03/2025\""
    )]
    end_date: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
    #[arg(short = 'p', long = "percentage", help = "Hide domains below this share of the day", default_value_t = Percentage::new_opt(1.).unwrap())]
    min_percentage: Percentage,
}

/// Command to process `report`. Prints recorded screen time per day and
/// domain, most used first, between `start_date` and `end_date` (both
/// treated as whole days; the store has no finer granularity).
pub async fn process_report_command(
    ReportCommand {
        start_date,
        end_date,
        date_style,
        min_percentage,
    }: ReportCommand,
) -> Result<()> {
    let (start, end) = parse_range(start_date, end_date, date_style)?;

    let store = JsonFileStore::new(create_application_default_path()?.join("store"))?;
    let Some(data) = store.get::<ScreenTimeStore>(SCREEN_TIME_KEY).await? else {
        println!("No screen time recorded yet.");
        return Ok(());
    };

    let mut printed_any = false;
    let mut date = start;
    while date < end {
        if let Some(day) = data.day(date) {
            if !day.is_empty() {
                print_day(date, day, min_percentage);
                printed_any = true;
            }
        }
        date = date.succ_opt().expect("End of time should never happen");
    }

    if !printed_any {
        println!("No screen time recorded between {start} and {end}.");
    }
    Ok(())
}

/// Also provides sensible defaults: the current day.
fn parse_range(
    start_date: Option<String>,
    end_date: Option<String>,
    date_style: DateStyle,
) -> Result<(NaiveDate, NaiveDate)> {
    let now = Local::now();
    let dialect: chrono_english::Dialect = date_style.into();

    let start: DateTime<Local> = match start_date.map(|s| parse_date_string(&s, now, dialect)) {
        Some(Ok(v)) => v.with_timezone(&Local),
        Some(Err(e)) => {
            return Err(Args::command()
                .error(
                    clap::error::ErrorKind::ValueValidation,
                    format!("Failed to validate start date {e}"),
                )
                .into());
        }
        None => now,
    };
    let end: DateTime<Local> = match end_date.map(|s| parse_date_string(&s, now, dialect)) {
        Some(Ok(v)) => v.with_timezone(&Local),
        Some(Err(e)) => {
            return Err(Args::command()
                .error(
                    clap::error::ErrorKind::ValueValidation,
                    format!("Failed to validate end date {e}"),
                )
                .into());
        }
        None => now,
    };

    Ok((
        start.beginning_of_day().date_naive(),
        next_day_start(end).date_naive(),
    ))
}

fn print_day(date: NaiveDate, day: &DayBucket, min_percentage: Percentage) {
    let total = day.total_seconds();
    let header = ansi_term::Style::new().bold();
    let dim = ansi_term::Style::new().dimmed();

    println!("{}", header.paint(date_key(date)));
    for (domain, entry) in day.entries_by_usage() {
        let share = seconds_percentage(entry.accumulated_seconds, total);
        if share < min_percentage {
            continue;
        }
        println!(
            "  {}\t{}\t{}",
            dim.paint(format!("{}%", *share as i32)),
            format_seconds(entry.accumulated_seconds),
            domain
        );
    }
    println!("  {}\t{}", dim.paint("total"), format_seconds(total));
    println!();
}
