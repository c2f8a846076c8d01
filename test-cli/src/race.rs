use std::future::Future;
use std::io::Write;
use std::time::Duration;

use crate::error::{Error, Result};

pub const PROBE_ATTEMPTS: u32 = 5;
pub const PROBE_INTERVAL: Duration = Duration::from_secs(2);
pub const PROBE_QUERY: &str = "SELECT 1 as ready";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Immediate,
    Tolerated { attempt: u32 },
}

/// Runs `query` up to `attempts` times, `interval` apart, until it returns
/// output containing `ready`. Progress is written to `out`.
pub async fn probe<W, F, Fut>(
    out: &mut W,
    engine: &'static str,
    attempts: u32,
    interval: Duration,
    mut query: F,
) -> Result<ProbeOutcome>
where
    W: Write,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<String>>,
{
    let mut last_err = None;

    for attempt in 1..=attempts {
        writeln!(out, "Connection attempt {attempt}/{attempts}...")?;

        let err = match query(attempt).await {
            Ok(output) if output.contains("ready") => {
                writeln!(out, "Connection successful on attempt {attempt}")?;

                let outcome = if attempt == 1 {
                    writeln!(
                        out,
                        "No race condition detected - database ready immediately when status was Ready"
                    )?;
                    ProbeOutcome::Immediate
                } else {
                    writeln!(
                        out,
                        "WARNING: Connection failed on first attempt but succeeded later - race condition tolerated"
                    )?;
                    ProbeOutcome::Tolerated { attempt }
                };

                return Ok(outcome);
            }
            Ok(output) => Error::not_found(format!(
                "ready marker in query output: {}",
                output.trim()
            )),
            Err(err) => err,
        };

        writeln!(out, "   Failed (attempt {attempt}): {err}")?;
        last_err = Some(Box::new(err));

        if attempt < attempts {
            tokio::time::sleep(interval).await;
        }
    }

    Err(Error::RaceDetected {
        engine,
        attempts,
        last: last_err,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn immediate_success() {
        let mut out = Vec::new();
        let outcome = probe(&mut out, "MySQL", PROBE_ATTEMPTS, PROBE_INTERVAL, |_| async {
            Ok("ready\n1\n".to_string())
        })
        .await
        .unwrap();

        assert_eq!(outcome, ProbeOutcome::Immediate);
        assert!(String::from_utf8(out)
            .unwrap()
            .contains("No race condition detected"));
    }

    #[tokio::test(start_paused = true)]
    async fn fails_once_then_succeeds_is_tolerated() {
        let mut out = Vec::new();
        let outcome = probe(
            &mut out,
            "PostgreSQL",
            PROBE_ATTEMPTS,
            PROBE_INTERVAL,
            |attempt| async move {
                if attempt == 1 {
                    Err(Error::not_found("connection refused"))
                } else {
                    Ok(" ready \n-------\n     1\n(1 row)\n".to_string())
                }
            },
        )
        .await
        .unwrap();

        assert_eq!(outcome, ProbeOutcome::Tolerated { attempt: 2 });

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Failed (attempt 1)"));
        assert!(text.contains("race condition tolerated"));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausting_attempts_is_a_hard_failure() {
        let mut out = Vec::new();
        let mut calls = 0;

        let err = probe(&mut out, "MySQL", PROBE_ATTEMPTS, PROBE_INTERVAL, |_| {
            calls += 1;
            async { Err(Error::not_found("connection refused")) }
        })
        .await
        .unwrap_err();

        assert_eq!(calls, PROBE_ATTEMPTS);
        assert!(matches!(err, Error::RaceDetected { attempts: 5, .. }));
        assert!(err.to_string().starts_with("RACE CONDITION DETECTED"));
    }

    #[tokio::test(start_paused = true)]
    async fn output_without_marker_counts_as_failure() {
        let mut out = Vec::new();
        let err = probe(&mut out, "MySQL", 2, PROBE_INTERVAL, |_| async {
            Ok(String::new())
        })
        .await
        .unwrap_err();

        assert!(matches!(err, Error::RaceDetected { attempts: 2, .. }));
    }
}
