//! Runtime behaviour of built-in functions
//!
//! Arity is checked when the rule is parsed; a missing argument here reads
//! as empty.

use crate::value::{format_number, Value};
use chrono::{Datelike, NaiveDate, NaiveTime};
use rangeval_dsl::Builtin;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M";

pub fn call(function: Builtin, args: &[Value], today: NaiveDate) -> Value {
    let arg = |i: usize| args.get(i).cloned().unwrap_or(Value::Empty);

    match function {
        Builtin::Len => Value::Number(arg(0).len() as f64),
        Builtin::Not => Value::Bool(!arg(0).is_truthy()),
        Builtin::IsDate => Value::Bool(parse_date(&arg(0)).is_some()),
        Builtin::IsTime => Value::Bool(parse_time(&arg(0)).is_some()),
        Builtin::IsNumber => Value::Bool(arg(0).strict_number().is_some()),
        Builtin::Today => Value::Text(today.format(DATE_FORMAT).to_string()),
        Builtin::Year => match parse_date(&arg(0)) {
            Some(date) => Value::Number(date.year() as f64),
            None => Value::Empty,
        },
        Builtin::DateDiff => match (parse_date(&arg(0)), parse_date(&arg(1))) {
            (Some(a), Some(b)) => Value::Number((a - b).num_days() as f64),
            _ => Value::Empty,
        },
        Builtin::Abs => numeric(&arg(0), f64::abs),
        Builtin::Round => {
            let places = arg(1).strict_number().unwrap_or(0.0).clamp(0.0, 12.0);
            let factor = 10f64.powi(places as i32);
            numeric(&arg(0), |n| (n * factor).round() / factor)
        }
        Builtin::Lower => Value::Text(arg(0).to_text().to_lowercase()),
        Builtin::Upper => Value::Text(arg(0).to_text().to_uppercase()),
        Builtin::Substr => {
            let text = arg(0).to_text();
            let start = arg(1).strict_number().unwrap_or(0.0).max(0.0) as usize;
            let chars = text.chars().skip(start);
            let taken: String = match args.get(2).and_then(Value::strict_number) {
                Some(length) => chars.take(length.max(0.0) as usize).collect(),
                None => chars.collect(),
            };
            Value::from_raw(&taken)
        }
        Builtin::Decimals => Value::Number(decimals(&arg(0)) as f64),
        Builtin::OnStep => {
            let (Some(value), Some(origin), Some(step)) = (
                arg(0).strict_number(),
                arg(1).strict_number(),
                arg(2).strict_number(),
            ) else {
                return Value::Bool(false);
            };
            if step <= 0.0 {
                return Value::Bool(false);
            }
            let steps = (value - origin) / step;
            Value::Bool((steps - steps.round()).abs() < 1e-9)
        }
        Builtin::Contains => Value::Bool(arg(0).to_text().contains(&arg(1).to_text())),
    }
}

fn numeric(value: &Value, op: impl Fn(f64) -> f64) -> Value {
    match value.strict_number() {
        Some(n) => Value::Number(op(n)),
        None => Value::Empty,
    }
}

/// Digits after the decimal point as written; 0 for non-numbers
fn decimals(value: &Value) -> usize {
    if value.strict_number().is_none() {
        return 0;
    }
    let text = match value {
        Value::Number(n) => format_number(*n),
        other => other.to_text(),
    };
    let text = text.trim();
    if text.contains(|c: char| c == 'e' || c == 'E') {
        return 0;
    }
    text.split_once('.')
        .map(|(_, fraction)| fraction.len())
        .unwrap_or(0)
}

fn parse_date(value: &Value) -> Option<NaiveDate> {
    let text = value.to_text();
    if text.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(&text, DATE_FORMAT).ok()
}

fn parse_time(value: &Value) -> Option<NaiveTime> {
    let text = value.to_text();
    if text.len() != 5 {
        return None;
    }
    NaiveTime::parse_from_str(&text, TIME_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn run(function: Builtin, args: &[&str]) -> Value {
        let args: Vec<Value> = args.iter().map(|a| Value::from_raw(a)).collect();
        call(function, &args, today())
    }

    #[test]
    fn dates_and_times() {
        assert_eq!(run(Builtin::IsDate, &["2024-02-29"]), Value::Bool(true));
        assert_eq!(run(Builtin::IsDate, &["2023-02-29"]), Value::Bool(false));
        assert_eq!(run(Builtin::IsDate, &["2024-2-1"]), Value::Bool(false));
        assert_eq!(run(Builtin::IsTime, &["23:59"]), Value::Bool(true));
        assert_eq!(run(Builtin::IsTime, &["24:00"]), Value::Bool(false));
        assert_eq!(run(Builtin::Today, &[]), Value::Text("2024-06-01".into()));
        assert_eq!(run(Builtin::Year, &["1990-05-04"]), Value::Number(1990.0));
        assert_eq!(run(Builtin::DateDiff, &["2024-06-01", "2024-05-01"]), Value::Number(31.0));
    }

    #[test]
    fn numbers() {
        assert_eq!(run(Builtin::IsNumber, &["-2.5"]), Value::Bool(true));
        assert_eq!(run(Builtin::IsNumber, &[""]), Value::Bool(false));
        assert_eq!(run(Builtin::Abs, &["-3"]), Value::Number(3.0));
        assert_eq!(run(Builtin::Round, &["2.346", "2"]), Value::Number(2.35));
        assert_eq!(run(Builtin::Decimals, &["36.60"]), Value::Number(2.0));
        assert_eq!(run(Builtin::Decimals, &["37"]), Value::Number(0.0));
        assert_eq!(run(Builtin::Decimals, &["abc.de"]), Value::Number(0.0));
        assert_eq!(run(Builtin::OnStep, &["36.5", "35", "0.5"]), Value::Bool(true));
        assert_eq!(run(Builtin::OnStep, &["36.3", "35", "0.5"]), Value::Bool(false));
        assert_eq!(run(Builtin::OnStep, &["36", "35", "0"]), Value::Bool(false));
    }

    #[test]
    fn text() {
        assert_eq!(run(Builtin::Len, &["héllo"]), Value::Number(5.0));
        assert_eq!(run(Builtin::Upper, &["abc"]), Value::Text("ABC".into()));
        assert_eq!(run(Builtin::Substr, &["abcdef", "1", "3"]), Value::Text("bcd".into()));
        assert_eq!(run(Builtin::Substr, &["abc", "5"]), Value::Empty);
        assert_eq!(run(Builtin::Contains, &["aspirin 81mg", "81"]), Value::Bool(true));
        assert_eq!(run(Builtin::Not, &[""]), Value::Bool(true));
    }
}
