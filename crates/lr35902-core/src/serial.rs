use crate::error::{CpuError, Result};
use crate::interrupts::{IF_ADDR, Interrupt};
use crate::memory::Memory;

/// Serial data register (SB).
pub const SB_ADDR: u16 = 0xFF01;
/// Serial control register (SC).
pub const SC_ADDR: u16 = 0xFF02;

const SC_TRANSFER_START: u8 = 0x80;

/// A link-cable backend, such as a UART or LAN adapter.
pub trait SerialTransport: Send {
    /// Names of peers that [`connect`](Self::connect) would accept.
    fn discover(&mut self) -> Vec<String>;

    fn connect(&mut self, name: &str) -> Result<()>;

    /// Advance the transport by `ticks` T-cycles.
    fn step(&mut self, ticks: u8);

    /// Exchange one byte with the partner. Returns the byte received.
    fn exchange(&mut self, byte: u8) -> u8;
}

/// No cable attached.
///
/// Incoming bits read as 1, so every exchange receives 0xFF. With `loopback`
/// set the outgoing byte is echoed back instead.
#[derive(Debug, Default)]
pub struct NullTransport {
    loopback: bool,
}

impl NullTransport {
    pub fn new(loopback: bool) -> Self {
        Self { loopback }
    }
}

impl SerialTransport for NullTransport {
    fn discover(&mut self) -> Vec<String> {
        Vec::new()
    }

    fn connect(&mut self, name: &str) -> Result<()> {
        Err(CpuError::Transport(format!("no link peer named {name:?}")))
    }

    fn step(&mut self, _ticks: u8) {}

    fn exchange(&mut self, byte: u8) -> u8 {
        if self.loopback { byte } else { 0xFF }
    }
}

/// Memory wrapper that completes serial transfers instantly.
///
/// Writing SC with bit 7 set sends SB through the transport, records the
/// outgoing byte, clears bit 7 and raises the serial interrupt. Test ROMs
/// print their results this way.
pub struct SerialCapture<M: Memory> {
    inner: M,
    transport: Box<dyn SerialTransport>,
    out_buf: Vec<u8>,
}

impl<M: Memory> SerialCapture<M> {
    pub fn new(inner: M) -> Self {
        Self::with_transport(inner, Box::new(NullTransport::default()))
    }

    pub fn with_transport(inner: M, transport: Box<dyn SerialTransport>) -> Self {
        Self {
            inner,
            transport,
            out_buf: Vec::new(),
        }
    }

    pub fn transport_mut(&mut self) -> &mut dyn SerialTransport {
        self.transport.as_mut()
    }

    /// Bytes sent so far.
    pub fn output(&self) -> &[u8] {
        &self.out_buf
    }

    pub fn output_lossy(&self) -> String {
        String::from_utf8_lossy(&self.out_buf).into_owned()
    }
}

impl<M: Memory> Memory for SerialCapture<M> {
    fn read_byte(&self, addr: u16) -> u8 {
        self.inner.read_byte(addr)
    }

    fn write_byte(&mut self, addr: u16, val: u8) {
        if addr == SC_ADDR && val & SC_TRANSFER_START != 0 {
            let outgoing = self.inner.read_byte(SB_ADDR);
            let incoming = self.transport.exchange(outgoing);
            self.out_buf.push(outgoing);
            self.inner.write_byte(SB_ADDR, incoming);
            self.inner.write_byte(SC_ADDR, val & !SC_TRANSFER_START);
            let flags = self.inner.read_byte(IF_ADDR);
            self.inner.write_byte(IF_ADDR, flags | Interrupt::Serial.bit());
            return;
        }
        self.inner.write_byte(addr, val);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::FlatMemory;

    struct FixedIn {
        ret: u8,
    }

    impl SerialTransport for FixedIn {
        fn discover(&mut self) -> Vec<String> {
            vec!["fixed".to_string()]
        }

        fn connect(&mut self, name: &str) -> Result<()> {
            if name == "fixed" {
                Ok(())
            } else {
                Err(CpuError::Transport(name.to_string()))
            }
        }

        fn step(&mut self, _ticks: u8) {}

        fn exchange(&mut self, _byte: u8) -> u8 {
            self.ret
        }
    }

    #[test]
    fn null_transport_has_no_peers() {
        let mut t = NullTransport::default();
        assert!(t.discover().is_empty());
        assert!(matches!(t.connect("COM1"), Err(CpuError::Transport(_))));
        assert_eq!(t.exchange(0x12), 0xFF);
        assert_eq!(NullTransport::new(true).exchange(0x12), 0x12);
    }

    #[test]
    fn transfer_completes_immediately() {
        let transport = FixedIn { ret: 0x34 };
        let mut mem = SerialCapture::with_transport(FlatMemory::new(), Box::new(transport));
        mem.write_byte(SB_ADDR, b'O');
        mem.write_byte(SC_ADDR, 0x81);
        mem.write_byte(SB_ADDR, b'K');
        mem.write_byte(SC_ADDR, 0x81);

        assert_eq!(mem.output_lossy(), "OK");
        assert_eq!(mem.read_byte(SB_ADDR), 0x34);
        assert_eq!(mem.read_byte(SC_ADDR), 0x01);
        assert_eq!(mem.read_byte(IF_ADDR) & 0x08, 0x08);
        assert!(mem.transport_mut().connect("fixed").is_ok());
    }

    #[test]
    fn sc_without_start_bit_is_plain_write() {
        let mut mem = SerialCapture::new(FlatMemory::new());
        mem.write_byte(SC_ADDR, 0x01);
        assert!(mem.output().is_empty());
        assert_eq!(mem.read_byte(SC_ADDR), 0x01);
    }
}
