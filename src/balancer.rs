//! The Load Balancer (spec §4.5): invoked when a heartbeating server has
//! nothing new to open, decides how many regions it must shed.

/// `slop` (tolerance band) and `maxRegToClose` (shed-per-call cap), spec §4.5
/// / §6. Constructed from `Options` so the values come from config rather
/// than being hardcoded at call sites.
#[derive(Clone, Copy, Debug)]
pub struct LoadBalancer {
    pub slop: f64,
    pub max_reg_to_close: i64,
}

impl LoadBalancer {
    pub fn new(slop: f64, max_reg_to_close: i64) -> Self {
        // Open Question (b): slop <= 0 is silently reset to 1 (100%
        // tolerance) rather than rejected, preserving historical behavior
        // unless a caller opts into strict validation elsewhere.
        let slop = if slop <= 0.0 { 1.0 } else { slop };
        LoadBalancer {
            slop,
            max_reg_to_close,
        }
    }

    /// How many regions (if any) `load` must shed, and the reason, given the
    /// fleet's other per-server region counts. Returns 0 when no shedding is
    /// warranted.
    pub fn regions_to_shed(&self, load: usize, other_loads: &[usize]) -> usize {
        if other_loads.is_empty() {
            return 0;
        }
        let avg = fleet_average(load, other_loads);
        if (load as f64) <= avg.floor() || avg <= 2.0 {
            return 0;
        }

        let overload_threshold = (avg * (1.0 + self.slop)).ceil();
        let shed = if (load as f64) > overload_threshold {
            // Primary shedding path.
            (load as f64 - avg.ceil()).max(0.0) as usize
        } else {
            self.shed_to_lightly_loaded(load, avg, other_loads)
        };

        match self.max_reg_to_close {
            n if n < 0 => shed,
            n => shed.min(n as usize),
        }
    }

    /// If the reporting server is the fleet's single most-loaded tier and
    /// the lightest tier is meaningfully below average, shed just enough to
    /// help rebalance toward it (spec §4.5's secondary shedding path).
    fn shed_to_lightly_loaded(&self, load: usize, avg: f64, other_loads: &[usize]) -> usize {
        let max_other = other_loads.iter().copied().max().unwrap_or(0);
        if load < max_other {
            // Not the most-loaded tier; nothing to shed on this path.
            return 0;
        }
        let lightest = other_loads.iter().copied().min().unwrap_or(load);
        let avg_minus_slop = (avg * (1.0 - self.slop)).floor();
        if (lightest as f64) >= avg_minus_slop - 1.0 {
            return 0;
        }
        let n_light_servers = other_loads
            .iter()
            .filter(|&&l| (l as f64) < avg_minus_slop)
            .count();
        let cap_a = (load as f64 - avg.floor()).max(0.0);
        let cap_b = (avg_minus_slop - lightest as f64) * n_light_servers as f64;
        cap_a.min(cap_b).max(0.0) as usize
    }
}

fn fleet_average(this_load: usize, other_loads: &[usize]) -> f64 {
    let total: usize = this_load + other_loads.iter().sum::<usize>();
    let count = 1 + other_loads.len();
    total as f64 / count as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_average_server_sheds_nothing() {
        let balancer = LoadBalancer::new(0.3, -1);
        assert_eq!(balancer.regions_to_shed(5, &[10, 10, 10]), 0);
    }

    #[test]
    fn small_fleet_average_sheds_nothing() {
        let balancer = LoadBalancer::new(0.3, -1);
        // avg <= 2.0, never shed regardless of imbalance.
        assert_eq!(balancer.regions_to_shed(4, &[0]), 0);
    }

    #[test]
    fn overloaded_server_sheds_down_to_ceil_average() {
        let balancer = LoadBalancer::new(0.3, -1);
        // avg of [20, 10, 10, 10] = 12.5; overload threshold = ceil(12.5*1.3) = 17
        // 20 > 17 -> shed = 20 - ceil(12.5) = 20 - 13 = 7
        let shed = balancer.regions_to_shed(20, &[10, 10, 10]);
        assert_eq!(shed, 7);
    }

    #[test]
    fn max_reg_to_close_caps_the_shed_amount() {
        let balancer = LoadBalancer::new(0.3, 3);
        let shed = balancer.regions_to_shed(20, &[10, 10, 10]);
        assert_eq!(shed, 3);
    }

    #[test]
    fn non_positive_slop_is_clamped_to_full_tolerance() {
        let balancer = LoadBalancer::new(0.0, -1);
        assert_eq!(balancer.slop, 1.0);
    }
}
