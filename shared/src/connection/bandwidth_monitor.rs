use crate::constants::STAT_PERIOD;

/// Connection statistics, recomputed once per stat period
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ConnectionStats {
    pub in_bytes_per_second: u32,
    pub out_bytes_per_second: u32,
    pub in_packets_per_second: u32,
    pub out_packets_per_second: u32,
    /// Inbound packets never seen, since the connection started
    pub in_packets_lost: u32,
    /// Outbound packets the peer skipped acking, since the connection started
    pub out_packets_lost: u32,
    pub out_of_order_packets: u32,
    /// Mean round trip over the last period, in seconds
    pub average_lag: f64,
    /// How far the peer's receive rate falls short of what was sent, 0 to 100
    pub remote_saturation: f64,
}

pub struct BandwidthMonitor {
    stats: ConnectionStats,
    last_update: f64,
    in_bytes: usize,
    out_bytes: usize,
    in_packets: u32,
    out_packets: u32,
    lag_sum: f64,
    lag_count: u32,
}

impl BandwidthMonitor {
    pub fn new() -> Self {
        Self {
            stats: ConnectionStats::default(),
            last_update: 0.0,
            in_bytes: 0,
            out_bytes: 0,
            in_packets: 0,
            out_packets: 0,
            lag_sum: 0.0,
            lag_count: 0,
        }
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    pub fn record_received(&mut self, bytes: usize) {
        self.in_bytes += bytes;
        self.in_packets += 1;
    }

    pub fn record_sent(&mut self, bytes: usize) {
        self.out_bytes += bytes;
        self.out_packets += 1;
    }

    pub fn record_in_lost(&mut self, count: u32) {
        self.stats.in_packets_lost += count;
    }

    pub fn record_out_lost(&mut self, count: u32) {
        self.stats.out_packets_lost += count;
    }

    pub fn record_out_of_order(&mut self) {
        self.stats.out_of_order_packets += 1;
    }

    pub fn record_lag(&mut self, round_trip: f64) {
        self.lag_sum += round_trip;
        self.lag_count += 1;
    }

    pub fn set_remote_saturation(&mut self, saturation: f64) {
        self.stats.remote_saturation = saturation;
    }

    /// Inbound rate as reported to the peer in every ack
    pub fn in_kbytes_per_second(&self) -> u32 {
        self.stats.in_bytes_per_second / 1024
    }

    pub fn out_kbytes_per_second(&self) -> u32 {
        self.stats.out_bytes_per_second / 1024
    }

    /// Rolls the counters into the stats once a period has passed. Returns
    /// whether it did.
    pub fn update(&mut self, time: f64) -> bool {
        let elapsed = time - self.last_update;
        if elapsed < STAT_PERIOD {
            return false;
        }

        if self.lag_count > 0 {
            self.stats.average_lag = self.lag_sum / f64::from(self.lag_count);
        }
        self.stats.in_bytes_per_second = (self.in_bytes as f64 / elapsed) as u32;
        self.stats.out_bytes_per_second = (self.out_bytes as f64 / elapsed) as u32;
        self.stats.in_packets_per_second = (f64::from(self.in_packets) / elapsed) as u32;
        self.stats.out_packets_per_second = (f64::from(self.out_packets) / elapsed) as u32;

        self.in_bytes = 0;
        self.out_bytes = 0;
        self.in_packets = 0;
        self.out_packets = 0;
        self.lag_sum = 0.0;
        self.lag_count = 0;
        self.last_update = time;
        true
    }
}

impl Default for BandwidthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Share of the sent rate the receiver did not keep up with, in percent
pub fn remote_saturation(remote_kbytes_per_second: u32, out_kbytes_per_second_at_send: u32) -> f64 {
    if out_kbytes_per_second_at_send == 0 {
        return 0.0;
    }
    let ratio = f64::from(remote_kbytes_per_second) / f64::from(out_kbytes_per_second_at_send);
    (1.0 - ratio.min(1.0)) * 100.0
}
