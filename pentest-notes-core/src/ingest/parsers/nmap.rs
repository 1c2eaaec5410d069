//! Nmap normal-output parser
//!
//! Parses the human-readable format written by `nmap -oN`:
//!
//! ```text
//! Nmap scan report for dc01.corp.local (10.0.0.5)
//! Host is up (0.00042s latency).
//! PORT     STATE SERVICE       VERSION
//! 53/tcp   open  domain        Simple DNS Plus
//! 445/tcp  open  microsoft-ds?
//! Service Info: Host: DC01; OS: Windows; CPE: cpe:/o:microsoft:windows
//! ```
//!
//! Only ports in state `open` are kept. `OS details:` wins over the OS named
//! in `Service Info:`. Script output (`|` lines) is ignored.

use crate::error::{Error, Result};
use crate::ingest::{ParsedOutput, ToolParser};
use crate::types::{HostDiscovery, Service};

const REPORT_PREFIX: &str = "Nmap scan report for ";

#[derive(Debug, Default)]
pub struct NmapParser;

impl NmapParser {
    pub fn new() -> Self {
        Self
    }
}

/// Host being assembled while its block is read.
#[derive(Default)]
struct HostBlock {
    discovery: HostDiscovery,
    os_details: Option<String>,
    service_info_os: Option<String>,
    in_port_table: bool,
}

impl HostBlock {
    fn finish(mut self) -> HostDiscovery {
        self.discovery.os = self.os_details.or(self.service_info_os);
        self.discovery
    }
}

/// `dc01.corp.local (10.0.0.5)` or `10.0.0.5` into (ip, hostname).
fn parse_target(rest: &str) -> (String, Option<String>) {
    let rest = rest.trim();
    if let Some(open) = rest.rfind(" (") {
        if rest.ends_with(')') {
            let hostname = rest[..open].trim();
            let ip = &rest[open + 2..rest.len() - 1];
            let hostname = (!hostname.is_empty()).then(|| hostname.to_string());
            return (ip.to_string(), hostname);
        }
    }
    (rest.to_string(), None)
}

/// `445/tcp  open  microsoft-ds  Samba 4.x` into a service, if open.
fn parse_port_row(line: &str) -> Option<Option<Service>> {
    let mut tokens = line.split_whitespace();
    let (port, protocol) = tokens.next()?.split_once('/')?;
    let port: u16 = port.parse().ok()?;
    let state = tokens.next()?;
    if state != "open" {
        return Some(None);
    }

    let name = tokens.next().unwrap_or_default().trim_end_matches('?');
    let version = tokens.collect::<Vec<_>>().join(" ");
    Some(Some(
        Service::new(port, protocol)
            .named(name)
            .with_version(version),
    ))
}

/// OS named in a `Service Info:` line (`Host: X; OS: Windows; CPE: ...`).
fn service_info_os(info: &str) -> Option<String> {
    info.split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("OS:"))
        .map(|os| os.trim().to_string())
        .filter(|os| !os.is_empty())
}

impl ToolParser for NmapParser {
    fn name(&self) -> &'static str {
        "nmap"
    }

    fn parse(&self, content: &str) -> Result<ParsedOutput> {
        let trimmed = content.trim_start();
        if trimmed.starts_with("<?xml") || trimmed.starts_with("<nmaprun") {
            return Err(Error::Parse {
                tool: self.name().to_string(),
                message: "XML output is not supported; save scans with -oN".to_string(),
            });
        }

        let mut output = ParsedOutput::default();
        let mut current: Option<HostBlock> = None;

        for (lineno, line) in content.lines().enumerate() {
            if let Some(rest) = line.strip_prefix(REPORT_PREFIX) {
                if let Some(block) = current.take() {
                    output.hosts.push(block.finish());
                }
                let (ip, hostname) = parse_target(rest);
                current = Some(HostBlock {
                    discovery: HostDiscovery {
                        ip,
                        hostname,
                        ..Default::default()
                    },
                    ..Default::default()
                });
                continue;
            }

            let Some(block) = current.as_mut() else {
                continue;
            };

            if line.starts_with("PORT ") && line.contains("STATE") {
                block.in_port_table = true;
                continue;
            }

            if block.in_port_table {
                if line.starts_with('|') {
                    continue;
                }
                match parse_port_row(line) {
                    Some(Some(service)) => {
                        block.discovery.services.push(service);
                        continue;
                    }
                    Some(None) => continue,
                    None => block.in_port_table = false,
                }
            }

            if let Some(os) = line.strip_prefix("OS details:") {
                block.os_details = Some(os.trim().to_string());
            } else if let Some(info) = line.strip_prefix("Service Info:") {
                block.service_info_os = service_info_os(info);
            } else if line.starts_with("Warning:") {
                output
                    .warnings
                    .push(format!("line {}: {}", lineno + 1, line.trim()));
            }
        }

        if let Some(block) = current.take() {
            output.hosts.push(block.finish());
        }
        if output.hosts.is_empty() {
            output
                .warnings
                .push("no 'Nmap scan report for' lines found".to_string());
        }

        tracing::debug!(
            hosts = output.hosts.len(),
            warnings = output.warnings.len(),
            "parsed nmap output"
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCAN: &str = "\
# Nmap 7.94 scan initiated Sat Mar  1 10:00:00 2025 as: nmap -sV -O -oN scan.txt 10.0.0.0/24
Nmap scan report for dc01.corp.local (10.0.0.5)
Host is up (0.00042s latency).
Not shown: 995 closed tcp ports (reset)
PORT     STATE    SERVICE       VERSION
53/tcp   open     domain        Simple DNS Plus
88/tcp   open     kerberos-sec  Microsoft Windows Kerberos (server time: 2025-03-01 10:00:05Z)
135/tcp  filtered msrpc
445/tcp  open     microsoft-ds?
| smb2-security-mode:
|_  3.1.1: Message signing enabled and required
161/udp  open     snmp          SNMPv1 server; net-snmp SNMPv3 server (public)
MAC Address: 00:50:56:AA:BB:CC (VMware)
Service Info: Host: DC01; OS: Windows; CPE: cpe:/o:microsoft:windows

Nmap scan report for 10.0.0.7
Host is up (0.00050s latency).
PORT   STATE SERVICE VERSION
22/tcp open  ssh     OpenSSH 8.9p1 Ubuntu 3ubuntu0.6 (Ubuntu Linux; protocol 2.0)
Service Info: OS: Linux; CPE: cpe:/o:linux:linux_kernel
OS details: Linux 5.0 - 5.14

# Nmap done at Sat Mar  1 10:01:00 2025 -- 256 IP addresses (2 hosts up) scanned in 60.00 seconds
";

    #[test]
    fn test_parse_hosts_and_open_ports() {
        let output = NmapParser::new().parse(SCAN).unwrap();
        assert_eq!(output.hosts.len(), 2);
        assert!(output.findings.is_empty());

        let dc = &output.hosts[0];
        assert_eq!(dc.ip, "10.0.0.5");
        assert_eq!(dc.hostname.as_deref(), Some("dc01.corp.local"));
        assert_eq!(dc.os.as_deref(), Some("Windows"));
        let ports: Vec<(u16, &str)> = dc.services.iter().map(|s| s.key()).collect();
        assert_eq!(ports, vec![(53, "tcp"), (88, "tcp"), (445, "tcp"), (161, "udp")]);
        assert_eq!(dc.services[2].service, "microsoft-ds");
        assert_eq!(dc.services[2].version, "");
        assert!(dc.services[1].version.starts_with("Microsoft Windows Kerberos"));
    }

    #[test]
    fn test_os_details_win_over_service_info() {
        let output = NmapParser::new().parse(SCAN).unwrap();
        let linux = &output.hosts[1];
        assert_eq!(linux.ip, "10.0.0.7");
        assert_eq!(linux.hostname, None);
        assert_eq!(linux.os.as_deref(), Some("Linux 5.0 - 5.14"));
        assert_eq!(linux.services[0].service, "ssh");
    }

    #[test]
    fn test_no_hosts_is_a_warning() {
        let output = NmapParser::new().parse("Starting Nmap\n").unwrap();
        assert!(output.hosts.is_empty());
        assert_eq!(output.warnings.len(), 1);
    }

    #[test]
    fn test_xml_is_rejected() {
        let err = NmapParser::new()
            .parse("<?xml version=\"1.0\"?>\n<nmaprun>")
            .unwrap_err();
        assert!(matches!(err, Error::Parse { tool, .. } if tool == "nmap"));
    }

    #[test]
    fn test_parse_target() {
        assert_eq!(
            parse_target("host.example (192.168.1.1)"),
            ("192.168.1.1".to_string(), Some("host.example".to_string()))
        );
        assert_eq!(parse_target("fe80::1"), ("fe80::1".to_string(), None));
    }
}
