/// Tracks how far ahead of its bandwidth budget a connection has sent.
/// Sending adds to the balance, time pays it down, and a negative balance
/// is saved-up allowance bounded to two ticks' worth.
pub struct FlowControl {
    bandwidth_bytes_per_second: u32,
    queued_bits: i64,
}

impl FlowControl {
    pub fn new(bandwidth_bytes_per_second: u32) -> Self {
        Self {
            bandwidth_bytes_per_second,
            queued_bits: 0,
        }
    }

    pub fn queued_bits(&self) -> i64 {
        self.queued_bits
    }

    pub fn bandwidth(&self) -> u32 {
        self.bandwidth_bytes_per_second
    }

    pub fn set_bandwidth(&mut self, bandwidth_bytes_per_second: u32) {
        self.bandwidth_bytes_per_second = bandwidth_bytes_per_second;
    }

    pub fn record_sent(&mut self, bytes: usize, overhead_bytes: usize) {
        self.queued_bits += ((bytes + overhead_bytes) * 8) as i64;
    }

    pub fn decay(&mut self, delta_seconds: f64) {
        let budget_bits = f64::from(self.bandwidth_bytes_per_second) * delta_seconds * 8.0;
        self.queued_bits -= budget_bits as i64;
        let floor = -(2.0 * budget_bits) as i64;
        if self.queued_bits < floor {
            self.queued_bits = floor;
        }
    }

    /// Whether `buffered_bits` more may be committed right now
    pub fn is_net_ready(&self, buffered_bits: usize) -> bool {
        self.queued_bits + buffered_bits as i64 <= 0
    }
}
