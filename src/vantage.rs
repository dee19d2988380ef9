//! VantagePoint: executes `ping` from a named location and returns a
//! normalized measurement or one of three non-retryable failure kinds.

use std::net::ToSocketAddrs;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use tokio::time::timeout;
use tracing::debug;

use crate::error::PingError;
use crate::model::Measurement;

#[async_trait]
pub trait VantagePoint: Send + Sync {
    /// Vantage's display name, used in logs only.
    fn name(&self) -> &str;

    async fn ping(&self, host: &str, count: u32) -> Result<Measurement, PingError>;
}

/// Runs real ICMP echo requests from this machine using `surge-ping`,
/// reusing one client per vantage rather than opening a new one per ping.
pub struct IcmpVantagePoint {
    name: String,
    client: surge_ping::Client,
    per_ping_timeout: Duration,
}

impl IcmpVantagePoint {
    pub fn new(name: impl Into<String>, per_ping_timeout: Duration) -> Result<Self, PingError> {
        let client = surge_ping::Client::new(&surge_ping::Config::default())
            .map_err(|e| PingError::Transport(e.to_string()))?;
        Ok(IcmpVantagePoint {
            name: name.into(),
            client,
            per_ping_timeout,
        })
    }
}

#[async_trait]
impl VantagePoint for IcmpVantagePoint {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ping(&self, host: &str, count: u32) -> Result<Measurement, PingError> {
        let ip = format!("{host}:0")
            .to_socket_addrs()
            .map_err(|e| PingError::Transport(format!("failed to resolve {host}: {e}")))?
            .next()
            .ok_or_else(|| PingError::Transport(format!("no address found for {host}")))?
            .ip();

        let mut pinger = self
            .client
            .pinger(ip, surge_ping::PingIdentifier(rand::random()))
            .await;

        let payload = [0u8; 8];
        let mut rtts_ms: Vec<f64> = Vec::new();
        let mut received = 0u32;

        for seq in 0..count {
            match timeout(
                self.per_ping_timeout,
                pinger.ping(surge_ping::PingSequence(seq as u16), &payload),
            )
            .await
            {
                Ok(Ok((_packet, duration))) => {
                    received += 1;
                    rtts_ms.push(duration.as_secs_f64() * 1000.0);
                }
                Ok(Err(e)) => {
                    debug!(vantage = %self.name, %host, "ping #{seq} failed: {e}");
                }
                Err(_) => {
                    debug!(vantage = %self.name, %host, "ping #{seq} timed out");
                }
            }
        }

        Ok(Measurement {
            destination_ip: ip.to_string(),
            packets_transmitted: count,
            packets_received: received,
            rtt_min: decimal_from(rtts_ms.iter().cloned().fold(f64::NAN, f64::min)),
            rtt_avg: decimal_from(mean(&rtts_ms)),
            rtt_max: decimal_from(rtts_ms.iter().cloned().fold(f64::NAN, f64::max)),
            rtt_stddev: decimal_from(stddev(&rtts_ms)),
        })
    }
}

fn decimal_from(v: f64) -> Option<Decimal> {
    if v.is_finite() { Decimal::from_f64(v) } else { None }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn stddev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Runs a remote command and returns its raw stdout, or fails. A narrow
/// seam so a fake can stand in for tests; a production binary would back
/// this with a real SSH session.
#[async_trait]
pub trait ShellRunner: Send + Sync {
    async fn run(&self, command: &str) -> Result<String, PingError>;
}

/// Parses `ping -c<count> -q <host>` summary output from a remote shell and
/// wraps it as a `VantagePoint`. Distinguishes connection failure, non-zero
/// or empty output, and unparsable output as distinct `PingError` kinds.
pub struct ShellVantagePoint<R: ShellRunner> {
    name: String,
    runner: R,
}

impl<R: ShellRunner> ShellVantagePoint<R> {
    pub fn new(name: impl Into<String>, runner: R) -> Self {
        ShellVantagePoint {
            name: name.into(),
            runner,
        }
    }
}

#[async_trait]
impl<R: ShellRunner> VantagePoint for ShellVantagePoint<R> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ping(&self, host: &str, count: u32) -> Result<Measurement, PingError> {
        let command = format!("ping -c{count} -q {host}");
        let output = self.runner.run(&command).await?;
        if output.trim().is_empty() {
            return Err(PingError::Command(format!(
                "output of command {command} is empty"
            )));
        }
        parse_ping_summary(&output)
    }
}

/// Parses the summary line(s) of a POSIX `ping -q` invocation, e.g.:
/// ```text
/// PING example.com (1.2.3.4): 56 data bytes
/// --- example.com ping statistics ---
/// 10 packets transmitted, 8 packets received, 20.0% packet loss
/// round-trip min/avg/max/stddev = 10.123/15.456/20.789/2.345 ms
/// ```
fn parse_ping_summary(output: &str) -> Result<Measurement, PingError> {
    let ip = output
        .lines()
        .find_map(|line| {
            let start = line.find('(')?;
            let end = line[start..].find(')')? + start;
            Some(line[start + 1..end].to_string())
        })
        .ok_or_else(|| PingError::Parse("missing destination IP in PING line".to_string()))?;

    let (transmitted, received) = output
        .lines()
        .find_map(parse_packet_counts)
        .ok_or_else(|| PingError::Parse("missing packet transmit/receive line".to_string()))?;

    if received > transmitted {
        return Err(PingError::Parse(
            "packets_received exceeds packets_transmitted".to_string(),
        ));
    }

    let rtts = output.lines().find_map(parse_round_trip_line);
    let (rtt_min, rtt_avg, rtt_max, rtt_stddev) = rtts.unwrap_or((None, None, None, None));

    Ok(Measurement {
        destination_ip: ip,
        packets_transmitted: transmitted,
        packets_received: received,
        rtt_min,
        rtt_avg,
        rtt_max,
        rtt_stddev,
    })
}

fn parse_packet_counts(line: &str) -> Option<(u32, u32)> {
    if !line.contains("packets transmitted") {
        return None;
    }
    let mut parts = line.split(',');
    let transmitted = parts.next()?.split_whitespace().next()?.parse().ok()?;
    let received = parts.next()?.split_whitespace().next()?.parse().ok()?;
    Some((transmitted, received))
}

type RoundTripTimes = (Option<Decimal>, Option<Decimal>, Option<Decimal>, Option<Decimal>);

fn parse_round_trip_line(line: &str) -> Option<RoundTripTimes> {
    let values = line.split('=').nth(1)?.split_whitespace().next()?;
    let mut parts = values.split('/');
    let min = parts.next()?.parse::<Decimal>().ok();
    let avg = parts.next()?.parse::<Decimal>().ok();
    let max = parts.next()?.parse::<Decimal>().ok();
    let stddev = parts.next().and_then(|s| s.parse::<Decimal>().ok());
    Some((min, avg, max, stddev))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "PING example.com (93.184.216.34): 56 data bytes\n\
--- example.com ping statistics ---\n\
10 packets transmitted, 8 packets received, 20.0% packet loss\n\
round-trip min/avg/max/stddev = 10.123/15.456/20.789/2.345 ms\n";

    #[test]
    fn parses_full_summary() {
        let m = parse_ping_summary(SAMPLE).unwrap();
        assert_eq!(m.destination_ip, "93.184.216.34");
        assert_eq!(m.packets_transmitted, 10);
        assert_eq!(m.packets_received, 8);
        assert_eq!(m.rtt_avg, Some("15.456".parse().unwrap()));
    }

    #[test]
    fn missing_destination_is_a_parse_error() {
        let err = parse_ping_summary("garbage\n").unwrap_err();
        assert!(matches!(err, PingError::Parse(_)));
    }

    #[test]
    fn received_never_exceeds_transmitted() {
        let bogus = "PING h (1.1.1.1): 56 data bytes\n\
--- h ping statistics ---\n\
5 packets transmitted, 9 packets received, 0% packet loss\n";
        let err = parse_ping_summary(bogus).unwrap_err();
        assert!(matches!(err, PingError::Parse(_)));
    }

    struct FakeRunner {
        output: String,
    }

    #[async_trait]
    impl ShellRunner for FakeRunner {
        async fn run(&self, _command: &str) -> Result<String, PingError> {
            Ok(self.output.clone())
        }
    }

    #[tokio::test]
    async fn shell_vantage_point_parses_runner_output() {
        let vp = ShellVantagePoint::new(
            "central",
            FakeRunner {
                output: SAMPLE.to_string(),
            },
        );
        let m = vp.ping("example.com", 10).await.unwrap();
        assert_eq!(m.packets_received, 8);
    }

    struct EmptyRunner;

    #[async_trait]
    impl ShellRunner for EmptyRunner {
        async fn run(&self, _command: &str) -> Result<String, PingError> {
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn empty_output_is_a_command_error() {
        let vp = ShellVantagePoint::new("central", EmptyRunner);
        let err = vp.ping("example.com", 10).await.unwrap_err();
        assert!(matches!(err, PingError::Command(_)));
    }
}
