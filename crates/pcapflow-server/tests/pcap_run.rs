//! Runs real capture files through every run mode.

use std::path::Path;

use pcapflow_core::{BuildStep, Config, TopologyError};
use pcapflow_server::run;
use pcapflow_server::stages::output::{DEBUG_LOG_FILE, FAST_LOG_FILE};

const PACKETS: u32 = 300;
const ARP_FRAMES: u32 = 5;
const RUNT_FRAMES: u32 = 2;

/// Ethernet/IPv4/TCP frame from 10.0.0.1:`sport` to 10.0.0.2:80.
fn tcp_frame(sport: u16, payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![0u8; 12];
    frame.extend_from_slice(&[0x08, 0x00]);
    let total = 20 + 20 + payload.len();
    frame.extend_from_slice(&[0x45, 0]);
    frame.extend_from_slice(&(total as u16).to_be_bytes());
    frame.extend_from_slice(&[0, 0, 0x40, 0, 64, 6, 0, 0]);
    frame.extend_from_slice(&[10, 0, 0, 1, 10, 0, 0, 2]);
    frame.extend_from_slice(&sport.to_be_bytes());
    frame.extend_from_slice(&80u16.to_be_bytes());
    frame.extend_from_slice(&[0u8; 8]);
    frame.extend_from_slice(&[0x50, 0x18, 0xff, 0xff, 0, 0, 0, 0]);
    frame.extend_from_slice(payload);
    frame
}

fn arp_frame() -> Vec<u8> {
    let mut frame = vec![0xffu8; 12];
    frame.extend_from_slice(&[0x08, 0x06]);
    frame.extend_from_slice(&[0u8; 28]);
    frame
}

/// Writes a little-endian Ethernet capture. Every third TCP packet carries
/// the "EVIL" marker.
fn write_capture(path: &Path) {
    let mut out = Vec::new();
    out.extend_from_slice(&0xa1b2_c3d4u32.to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&4u16.to_le_bytes());
    out.extend_from_slice(&[0u8; 8]);
    out.extend_from_slice(&65_535u32.to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes());

    let mut frames = Vec::new();
    for i in 0..PACKETS {
        let payload: &[u8] = if i % 3 == 0 { b"xxEVILxx" } else { b"hello" };
        frames.push(tcp_frame(40_000 + (i % 20) as u16, payload));
    }
    for _ in 0..ARP_FRAMES {
        frames.push(arp_frame());
    }
    for _ in 0..RUNT_FRAMES {
        frames.push(vec![0u8; 6]);
    }

    for (i, frame) in frames.iter().enumerate() {
        out.extend_from_slice(&(1_700_000_000 + i as u32).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        out.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        out.extend_from_slice(frame);
    }
    std::fs::write(path, out).unwrap();
}

fn config(dir: &Path, runmode: &str, extra: &str) -> Config {
    let yaml = format!(
        "runmode: {runmode}\n\
         pcap-file:\n  file: '{}'\n\
         default-log-dir: '{}'\n\
         max-pending-packets: 32\n\
         outputs: [alert-fastlog, alert-debuglog]\n\
         rules:\n  - {{sid: 2000001, msg: evil marker, content: EVIL}}\n\
         {extra}",
        dir.join("in.pcap").display(),
        dir.join("logs").display(),
    );
    Config::from_yaml_str(&yaml).unwrap()
}

#[test]
fn test_every_runmode_alerts_once_per_marked_packet() {
    for runmode in ["single", "auto", "autofp"] {
        let dir = tempfile::tempdir().unwrap();
        write_capture(&dir.path().join("in.pcap"));

        let report = run(&config(dir.path(), runmode, ""), 4).unwrap();
        assert_eq!(report.strategy.name(), runmode);

        // Runt frames fail to decode but still reach the outputs.
        let total = PACKETS + ARP_FRAMES + RUNT_FRAMES;
        assert_eq!(report.delivered(), u64::from(total), "{runmode}");
        let errors: u64 = report.workers.iter().map(|w| w.counters.errors).sum();
        assert_eq!(errors, 0, "{runmode}");

        let fast = std::fs::read_to_string(dir.path().join("logs").join(FAST_LOG_FILE)).unwrap();
        let expected_alerts = (0..PACKETS).filter(|i| i % 3 == 0).count();
        assert_eq!(fast.lines().count(), expected_alerts, "{runmode}");
        assert!(fast
            .lines()
            .all(|l| l.contains("[1:2000001:0] evil marker [**] {TCP} 10.0.0.1:")));

        let debug = std::fs::read_to_string(dir.path().join("logs").join(DEBUG_LOG_FILE)).unwrap();
        assert_eq!(debug.matches("ALERT CNT:").count(), expected_alerts, "{runmode}");
    }
}

#[test]
fn test_flow_mode_groups_detect_workers() {
    let dir = tempfile::tempdir().unwrap();
    write_capture(&dir.path().join("in.pcap"));
    let extra = "threading:\n  detect-thread-count: 3\n  queue-capacity: 4\n";

    let report = run(&config(dir.path(), "autofp", extra), 2).unwrap();
    let detect = &report.groups["Detect"];
    assert_eq!(
        report.workers.iter().filter(|w| w.info.group.as_deref() == Some("Detect")).count(),
        3
    );
    assert_eq!(detect.processed, report.delivered());
}

#[test]
fn test_missing_capture_key_is_a_configuration_error() {
    let config = Config::from_yaml_str("runmode: single\n").unwrap();
    let err = run(&config, 1).unwrap_err();
    let topology = err.downcast_ref::<TopologyError>().unwrap();
    assert_eq!(topology.step(), BuildStep::Configure);
}

#[test]
fn test_unreadable_capture_fails_before_running() {
    let dir = tempfile::tempdir().unwrap();
    // No capture written.
    let err = run(&config(dir.path(), "auto", ""), 2).unwrap_err();
    let topology = err.downcast_ref::<TopologyError>().unwrap();
    assert!(matches!(topology, TopologyError::StageCreate { .. }));
    assert_eq!(topology.step(), BuildStep::CreateWorkers);
}

#[test]
fn test_bad_rule_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    write_capture(&dir.path().join("in.pcap"));
    let mut yaml = String::from("pcap-file:\n  file: in.pcap\n");
    yaml.push_str("rules:\n  - {sid: 1, msg: broken, content: \"|4\"}\n");
    let err = run(&Config::from_yaml_str(&yaml).unwrap(), 1).unwrap_err();
    assert!(format!("{err:#}").contains("unterminated hex run"));
}
