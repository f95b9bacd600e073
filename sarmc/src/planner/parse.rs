use once_cell::sync::Lazy;
use regex::Regex;

use super::{Plan, PlanItem, PlannerError};

static PLAN_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\d+(?:\.\d+)?)\s*:\s*(\([^()]*\))\s*\[\s*(\d+(?:\.\d+)?)\s*\]\s*$").unwrap()
});

static TIMED_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\d+(?:\.\d+)?\s*:").unwrap());

/// Extract plan items from planner output.
///
/// Lines of the form `0.000: (move drone1 h1 a1) [10.000]` become items;
/// anything else (comments, search statistics) is ignored unless it starts
/// with a timestamp, in which case it is a malformed plan line. Returns
/// `None` when no plan line was found.
pub fn parse_plan_output(output: &str) -> Result<Option<Plan>, PlannerError> {
    let mut items = Vec::new();
    for (index, line) in output.lines().enumerate() {
        if let Some(caps) = PLAN_LINE.captures(line) {
            let time = parse_number(&caps[1], index + 1)?;
            let duration = parse_number(&caps[3], index + 1)?;
            let action = caps[2].split_whitespace().collect::<Vec<_>>().join(" ");
            items.push(PlanItem::new(time, action.to_lowercase(), duration));
        } else if TIMED_PREFIX.is_match(line) {
            return Err(PlannerError::Parse {
                line: index + 1,
                message: format!("unrecognized plan line '{}'", line.trim()),
            });
        }
    }

    if items.is_empty() {
        Ok(None)
    } else {
        Ok(Some(Plan::new(items)))
    }
}

fn parse_number(text: &str, line: usize) -> Result<f64, PlannerError> {
    text.parse().map_err(|_| PlannerError::Parse {
        line,
        message: format!("invalid number '{}'", text),
    })
}
