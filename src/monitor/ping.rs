//! Platform ping shell-out.
//!
//! One ping invocation decides reachability; the round-trip time is parsed
//! from the utility's output. Both conventional output families are
//! understood: the Unix `time=12.3 ms` form and the Windows
//! `Average = 12ms` summary form.

use std::net::IpAddr;

use tokio::process::Command;
use tracing::warn;

use super::probes::first_decimal_token;
use super::types::{PingResponse, PingStatus};

/// Ping a host once and report reachability plus latency.
pub async fn ping(address: IpAddr) -> PingResponse {
    let mut command = Command::new("ping");
    if cfg!(windows) {
        command.args(["-n", "1"]);
    } else {
        command.args(["-c", "1"]);
    }
    command.arg(address.to_string());

    match command.output().await {
        Ok(output) => outcome(
            output.status.success(),
            &String::from_utf8_lossy(&output.stdout),
        ),
        Err(error) => {
            warn!(%address, %error, "failed to run ping");
            PingResponse::offline()
        }
    }
}

/// Derive the response from the ping exit status and captured output.
fn outcome(success: bool, stdout: &str) -> PingResponse {
    if !success {
        return PingResponse::offline();
    }

    PingResponse {
        status: PingStatus::Online,
        latency: parse_latency(stdout),
    }
}

fn parse_latency(stdout: &str) -> Option<f64> {
    parse_unix_latency(stdout).or_else(|| parse_windows_latency(stdout))
}

/// `64 bytes from 10.0.0.1: icmp_seq=1 ttl=57 time=12.3 ms`
fn parse_unix_latency(stdout: &str) -> Option<f64> {
    let index = stdout.find("time=")?;
    first_decimal_token(&stdout[index + "time=".len()..])
}

/// `Minimum = 1ms, Maximum = 2ms, Average = 1ms`
fn parse_windows_latency(stdout: &str) -> Option<f64> {
    let index = stdout.find("Average = ")?;
    first_decimal_token(&stdout[index + "Average = ".len()..])
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNIX_OUTPUT: &str = "PING 10.0.0.1 (10.0.0.1) 56(84) bytes of data.\n\
        64 bytes from 10.0.0.1: icmp_seq=1 ttl=57 time=12.3 ms\n\
        \n\
        --- 10.0.0.1 ping statistics ---\n\
        1 packets transmitted, 1 received, 0% packet loss, time 0ms\n\
        rtt min/avg/max/mdev = 12.312/12.312/12.312/0.000 ms\n";

    const WINDOWS_OUTPUT: &str = "Pinging 10.0.0.1 with 32 bytes of data:\n\
        Reply from 10.0.0.1: bytes=32 time=1ms TTL=57\n\
        \n\
        Ping statistics for 10.0.0.1:\n\
        Packets: Sent = 1, Received = 1, Lost = 0 (0% loss),\n\
        Approximate round trip times in milli-seconds:\n\
        Minimum = 1ms, Maximum = 1ms, Average = 1ms\n";

    #[test]
    fn test_unix_output_parses_round_trip_time() {
        assert_eq!(parse_latency(UNIX_OUTPUT), Some(12.3));
    }

    #[test]
    fn test_windows_output_parses_round_trip_time() {
        // The per-reply `time=1ms` matches first; both forms agree here
        assert_eq!(parse_latency(WINDOWS_OUTPUT), Some(1.0));
    }

    #[test]
    fn test_windows_summary_form_alone() {
        let stdout = "Approximate round trip times in milli-seconds:\n\
            Minimum = 3ms, Maximum = 5ms, Average = 4ms\n";
        assert_eq!(parse_latency(stdout), Some(4.0));
    }

    #[test]
    fn test_garbage_output_yields_no_latency() {
        assert_eq!(parse_latency("ping: unknown host"), None);
    }

    #[test]
    fn test_failed_ping_is_offline_with_null_latency() {
        let response = outcome(false, UNIX_OUTPUT);
        assert_eq!(response.status, PingStatus::Offline);
        assert_eq!(response.latency, None);
    }

    #[test]
    fn test_successful_ping_is_online_with_latency() {
        let response = outcome(true, UNIX_OUTPUT);
        assert_eq!(response.status, PingStatus::Online);
        let latency = response.latency.unwrap();
        assert!(latency >= 0.0);
    }

    #[test]
    fn test_successful_ping_without_parsable_time_is_still_online() {
        let response = outcome(true, "1 packets transmitted");
        assert_eq!(response.status, PingStatus::Online);
        assert_eq!(response.latency, None);
    }
}
