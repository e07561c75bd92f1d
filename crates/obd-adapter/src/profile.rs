//! Adapter Dialect Profiles
//!
//! A profile captures everything dialect-specific about a scan-tool
//! adapter: the command vocabulary, the prompt character, and whether
//! the hardware owns frame checksumming. The driver itself stays
//! dialect-agnostic.

use obd_frame::BusProtocol;

/// Command dialect of a scan-tool adapter family
pub trait AdapterProfile: Send {
    /// Prompt byte marking end-of-response
    fn prompt(&self) -> u8;

    /// Whether the adapter computes and strips frame checksums itself
    fn appends_checksum(&self) -> bool;

    /// Bytes that interrupt any in-progress operation and provoke a
    /// fresh prompt, for baud-rate probing
    fn wakeup(&self) -> &'static [u8];

    /// Full reset to power-on defaults
    fn full_reset(&self) -> String;

    /// Warm reset keeping the configured baud rate
    fn warm_reset(&self) -> String;

    /// Read the adapter identification string
    fn identify(&self) -> String;

    /// Turn command echo on or off
    fn set_echo(&self, on: bool) -> String;

    /// Turn linefeeds after carriage returns on or off
    fn set_linefeeds(&self, on: bool) -> String;

    /// Turn frame headers in responses on or off
    fn set_headers(&self, on: bool) -> String;

    /// Select a protocol to try on the next vehicle request
    fn try_protocol(&self, protocol: BusProtocol) -> String;

    /// Ask which protocol is currently active
    fn describe_protocol(&self) -> String;

    /// Override the header bytes prepended to outgoing requests
    fn set_header(&self, header: &[u8]) -> String;

    /// Close the active protocol session, quieting the bus
    fn protocol_close(&self) -> String;
}

/// The ELM327 AT-command dialect, also spoken by its many clones
#[derive(Debug, Clone, Copy, Default)]
pub struct Elm327;

impl AdapterProfile for Elm327 {
    fn prompt(&self) -> u8 {
        b'>'
    }

    fn appends_checksum(&self) -> bool {
        true
    }

    fn wakeup(&self) -> &'static [u8] {
        // 0x7F is not a valid command, so this aborts anything pending
        // and forces a prompt without side effects
        b"\x7F\x7F\r"
    }

    fn full_reset(&self) -> String {
        "ATZ".to_string()
    }

    fn warm_reset(&self) -> String {
        "ATWS".to_string()
    }

    fn identify(&self) -> String {
        "ATI".to_string()
    }

    fn set_echo(&self, on: bool) -> String {
        format!("ATE{}", u8::from(on))
    }

    fn set_linefeeds(&self, on: bool) -> String {
        format!("ATL{}", u8::from(on))
    }

    fn set_headers(&self, on: bool) -> String {
        format!("ATH{}", u8::from(on))
    }

    fn try_protocol(&self, protocol: BusProtocol) -> String {
        format!("ATTP {}", protocol.adapter_code())
    }

    fn describe_protocol(&self) -> String {
        "ATDPN".to_string()
    }

    fn set_header(&self, header: &[u8]) -> String {
        let hex: String = header.iter().map(|b| format!("{b:02X}")).collect();
        format!("ATSH {hex}")
    }

    fn protocol_close(&self) -> String {
        "ATPC".to_string()
    }
}
