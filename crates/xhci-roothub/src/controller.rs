/// The slice of an xHCI host controller the root hubs depend on.
///
/// Physical port numbers are 1-based, as in the xHCI `PORTSC` array. Implementations are
/// shared between every root hub of a controller and may be called from any thread.
pub trait HostController: Send + Sync {
    /// `HCSPARAMS1.MaxPorts`.
    fn port_count(&self) -> u8;

    /// Raw extended capability dwords, starting at the first capability (`xECP`).
    fn ext_caps(&self) -> Vec<u32>;

    fn read_portsc(&self, port: u8) -> u32;

    /// Writes `value` verbatim. Callers are responsible for masking write-1-to-clear bits
    /// (see [`crate::regs::portsc_write_value`]).
    fn write_portsc(&self, port: u8, value: u32);
}
