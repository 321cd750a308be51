//! New Era NE-500-family pump driver.
//!
//! Implements [`PumpDriver`](super::PumpDriver) for the addressed
//! half-duplex protocol the NE-500/NE-1000 series speak over RS-232:
//!
//! - Command frame: `<address><command><CR>`, address in decimal.
//! - Response frame: `<STX><address><status><data><ETX>` where status is
//!   one of `I` (infusing), `W` (withdrawing), `S` (stopped), `P`
//!   (paused), `T` (timed pause), `U` (user wait) or `A` followed by an
//!   alarm code. Data beginning with `?` reports an unrecognized command.
//!
//! The codec is written against any blocking `Read + Write` transport so
//! unit tests drive it from an in-memory scripted port; the
//! `instrument_serial` feature adds [`NewEraDriver::open`] which binds it
//! to a real port via the `serialport` crate.
//!
//! There is no broadcast on this bus: fleet-wide stop/run iterate over the
//! addresses found at discovery, one frame per pump.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use super::{Direction, PumpDriver, PumpId};
use crate::error::{FleetError, Result};

const STX: u8 = 0x02;
const ETX: u8 = 0x03;

/// Driver for a chain of New Era pumps on one serial line.
pub struct NewEraDriver<T: Read + Write + Send> {
    transport: T,
    /// Overall deadline for one response frame; individual transport reads
    /// may time out sooner and are retried until this elapses.
    read_timeout: Duration,
    /// Highest address probed during discovery (exclusive).
    scan_limit: PumpId,
    /// Addresses that answered the scan; the targets of fleet-wide calls.
    addresses: Vec<PumpId>,
}

impl<T: Read + Write + Send> NewEraDriver<T> {
    /// Wrap an already-open transport.
    pub fn new(transport: T, read_timeout: Duration, scan_limit: PumpId) -> Self {
        Self {
            transport,
            read_timeout,
            scan_limit,
            addresses: Vec::new(),
        }
    }

    /// Addresses found by the last [`discover_pumps`](PumpDriver::discover_pumps) scan.
    pub fn addresses(&self) -> &[PumpId] {
        &self.addresses
    }

    fn write_frame(&mut self, pump: PumpId, command: &str) -> Result<()> {
        let frame = format!("{}{}\r", pump, command);
        self.transport.write_all(frame.as_bytes())?;
        self.transport.flush()?;
        debug!("-> pump {}: {}", pump, command);
        Ok(())
    }

    /// Read one STX..ETX frame, tolerating transport-level timeouts until
    /// the overall deadline.
    fn read_frame(&mut self, call: &'static str) -> Result<Vec<u8>> {
        let deadline = Instant::now() + self.read_timeout;
        let mut frame = Vec::new();
        let mut in_frame = false;
        let mut buf = [0u8; 1];

        loop {
            if Instant::now() > deadline {
                return Err(FleetError::Protocol {
                    call,
                    detail: format!("no response within {:?}", self.read_timeout),
                });
            }
            match self.transport.read(&mut buf) {
                Ok(0) => {
                    return Err(FleetError::Protocol {
                        call,
                        detail: "unexpected EOF from bus".to_string(),
                    })
                }
                Ok(_) => match buf[0] {
                    STX => {
                        in_frame = true;
                        frame.clear();
                    }
                    ETX if in_frame => return Ok(frame),
                    b if in_frame => frame.push(b),
                    // Noise outside a frame is dropped.
                    _ => {}
                },
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Send one addressed command and parse the response frame.
    ///
    /// Returns the data portion with the status char stripped.
    fn transact(&mut self, pump: PumpId, command: &str, call: &'static str) -> Result<String> {
        self.write_frame(pump, command)?;
        let frame = self.read_frame(call)?;
        let text = String::from_utf8_lossy(&frame).to_string();
        debug!("<- pump {}: {:?}", pump, text);

        let addr_len = text.bytes().take_while(|b| b.is_ascii_digit()).count();
        if addr_len == 0 {
            return Err(FleetError::Protocol {
                call,
                detail: format!("frame without address: {:?}", text),
            });
        }
        let addr: PumpId = text[..addr_len].parse().map_err(|_| FleetError::Protocol {
            call,
            detail: format!("bad address in frame: {:?}", text),
        })?;
        if addr != pump {
            return Err(FleetError::Protocol {
                call,
                detail: format!("response from pump {} while addressing {}", addr, pump),
            });
        }

        let mut rest = text[addr_len..].chars();
        let status = rest.next().ok_or_else(|| FleetError::Protocol {
            call,
            detail: format!("frame without status: {:?}", text),
        })?;
        let data: String = rest.collect();

        if status == 'A' {
            let code = data.chars().next().unwrap_or('?');
            return Err(FleetError::DeviceAlarm { pump, call, code });
        }
        if !matches!(status, 'I' | 'W' | 'S' | 'P' | 'T' | 'U' | 'X') {
            return Err(FleetError::Protocol {
                call,
                detail: format!("unknown status '{}' in frame {:?}", status, text),
            });
        }
        if data.starts_with('?') {
            return Err(FleetError::Protocol {
                call,
                detail: format!("pump {} rejected command {:?}: {}", pump, command, data),
            });
        }
        Ok(data)
    }

    /// True when the address answered a version query before the deadline.
    fn probe(&mut self, pump: PumpId) -> bool {
        match self.transact(pump, "VER", "discover_pumps") {
            Ok(version) => {
                info!("Pump {} answered scan: {}", pump, version.trim());
                true
            }
            Err(FleetError::Protocol { .. }) | Err(FleetError::DeviceAlarm { .. }) => false,
            Err(e) => {
                warn!("Scan of address {} failed: {}", pump, e);
                false
            }
        }
    }

    fn known_addresses(&self, call: &'static str) -> Result<Vec<PumpId>> {
        if self.addresses.is_empty() {
            return Err(FleetError::Protocol {
                call,
                detail: "no pumps discovered on this bus".to_string(),
            });
        }
        Ok(self.addresses.clone())
    }
}

/// Strip the trailing unit letters from a numeric readback, e.g.
/// `"100.0UH"` -> `"100.0"`.
fn strip_units(data: &str) -> String {
    data.trim()
        .trim_end_matches(|c: char| c.is_ascii_alphabetic())
        .to_string()
}

impl<T: Read + Write + Send> PumpDriver for NewEraDriver<T> {
    fn discover_pumps(&mut self) -> Result<Vec<PumpId>> {
        let mut found = Vec::new();
        for addr in 0..self.scan_limit {
            if self.probe(addr) {
                found.push(addr);
            }
        }
        if found.is_empty() {
            return Err(FleetError::NoPumpsFound);
        }
        self.addresses = found.clone();
        Ok(found)
    }

    fn stop_all(&mut self) -> Result<()> {
        for pump in self.known_addresses("stop_all")? {
            // A pump that is already stopped answers `STP` with an alarm-free
            // stopped status, so this is safe to issue unconditionally.
            self.transact(pump, "STP", "stop_all")?;
        }
        Ok(())
    }

    fn stop_pump(&mut self, pump: PumpId) -> Result<()> {
        self.transact(pump, "STP", "stop_pump")?;
        Ok(())
    }

    fn set_rates(&mut self, rates: &BTreeMap<PumpId, String>) -> Result<()> {
        for (&pump, rate) in rates {
            self.transact(pump, &format!("RAT{}UH", rate), "set_rates")?;
        }
        Ok(())
    }

    fn get_rates(&mut self, pumps: &[PumpId]) -> Result<BTreeMap<PumpId, String>> {
        let mut rates = BTreeMap::new();
        for &pump in pumps {
            let data = self.transact(pump, "RAT", "get_rates")?;
            rates.insert(pump, strip_units(&data));
        }
        Ok(rates)
    }

    fn run_all(&mut self) -> Result<()> {
        for pump in self.known_addresses("run_all")? {
            self.transact(pump, "RUN", "run_all")?;
        }
        Ok(())
    }

    fn run_pump(&mut self, pump: PumpId) -> Result<()> {
        self.transact(pump, "RUN", "run_pump")?;
        Ok(())
    }

    fn set_diameter(&mut self, pump: PumpId, diameter: &str) -> Result<()> {
        self.transact(pump, &format!("DIA{}", diameter), "set_diameter")?;
        Ok(())
    }

    fn get_diameter(&mut self, pump: PumpId) -> Result<String> {
        let data = self.transact(pump, "DIA", "get_diameter")?;
        Ok(strip_units(&data))
    }

    fn prime(&mut self, pump: PumpId) -> Result<()> {
        // Continuous pumping: select the rate function (no volume limit)
        // and start. The pump keeps running until stopped explicitly.
        self.transact(pump, "FUNRAT", "prime")?;
        self.transact(pump, "RUN", "prime")?;
        Ok(())
    }

    fn set_volume(&mut self, pump: PumpId, volume: f64) -> Result<()> {
        self.transact(pump, &format!("VOL{:.2}", volume), "set_volume")?;
        Ok(())
    }

    fn set_direction(&mut self, pump: PumpId, direction: Direction) -> Result<()> {
        let arg = match direction {
            Direction::Infuse => "INF",
            Direction::Withdraw => "WDR",
        };
        self.transact(pump, &format!("DIR{}", arg), "set_direction")?;
        Ok(())
    }

    fn run_for_duration(&mut self, pump: PumpId, duration: Duration) -> Result<()> {
        self.transact(pump, "RUN", "run_for_duration")?;
        std::thread::sleep(duration);
        self.transact(pump, "STP", "run_for_duration")?;
        Ok(())
    }
}

#[cfg(feature = "instrument_serial")]
impl NewEraDriver<Box<dyn serialport::SerialPort>> {
    /// Open the shared bus on a real serial port.
    ///
    /// The port-level timeout is set low so [`read_frame`] can poll; the
    /// per-call deadline comes from the bus settings.
    pub fn open(settings: &crate::config::BusSettings) -> Result<Self> {
        let port = serialport::new(&settings.port, settings.baud_rate)
            .timeout(Duration::from_millis(settings.read_timeout_ms))
            .open()
            .map_err(|e| {
                FleetError::BusUnavailable(format!(
                    "failed to open '{}' at {} baud: {}",
                    settings.port, settings.baud_rate, e
                ))
            })?;
        info!(
            "Connected to pump bus on '{}' at {} baud",
            settings.port, settings.baud_rate
        );
        Ok(Self::new(
            port,
            Duration::from_millis(settings.read_timeout_ms),
            settings.scan_limit,
        ))
    }
}

#[cfg(not(feature = "instrument_serial"))]
impl NewEraDriver<std::io::Empty> {
    /// Stub used when serial support is compiled out.
    pub fn open(_settings: &crate::config::BusSettings) -> Result<Self> {
        Err(FleetError::SerialFeatureDisabled)
    }
}
