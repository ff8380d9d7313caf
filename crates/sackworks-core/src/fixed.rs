use fixed::types::I32F32;

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits.
pub type Fixed64 = I32F32;

/// Ticks are the atomic unit of simulation time.
pub type Ticks = u64;

/// Ticks needed to travel one cell length at speed 1.0.
pub const CELL_TICKS: Ticks = 600;

/// Ticks per wall-clock second, used where visuals integrate in seconds.
pub const TICKS_PER_SECOND: Ticks = 1000;

/// Convert an f64 to Fixed64. Use only for initialization, never in sim loop.
#[inline]
pub fn f64_to_fixed64(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

/// Convert Fixed64 to f64. Use only for display, never in sim loop.
#[inline]
pub fn fixed64_to_f64(v: Fixed64) -> f64 {
    v.to_num::<f64>()
}

/// Travel time for a path of `length` cells at the given speed multiplier.
///
/// Rounds up and never returns less than one tick. Returns `None` when the
/// speed is not positive or the result does not fit.
pub fn travel_ticks(length: Fixed64, speed: Fixed64) -> Option<Ticks> {
    if speed <= Fixed64::ZERO {
        return None;
    }
    let scaled = length.checked_mul(Fixed64::from_num(CELL_TICKS))?;
    let ticks = scaled.checked_div(speed)?.ceil();
    if ticks < Fixed64::ZERO {
        return None;
    }
    Some(ticks.to_num::<Ticks>().max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed64_round_trip_through_f64() {
        let a = f64_to_fixed64(1.5);
        let b = f64_to_fixed64(2.0);
        assert_eq!(fixed64_to_f64(a + b), 3.5);
    }

    #[test]
    fn one_cell_at_unit_speed() {
        assert_eq!(travel_ticks(Fixed64::ONE, Fixed64::ONE), Some(CELL_TICKS));
    }

    #[test]
    fn faster_speed_shortens_travel() {
        let t = travel_ticks(Fixed64::ONE, f64_to_fixed64(2.0)).unwrap();
        assert_eq!(t, CELL_TICKS / 2);
    }

    #[test]
    fn zero_length_still_takes_a_tick() {
        assert_eq!(travel_ticks(Fixed64::ZERO, Fixed64::ONE), Some(1));
    }

    #[test]
    fn non_positive_speed_rejected() {
        assert_eq!(travel_ticks(Fixed64::ONE, Fixed64::ZERO), None);
        assert_eq!(travel_ticks(Fixed64::ONE, f64_to_fixed64(-1.0)), None);
    }

    #[test]
    fn fractional_ticks_round_up() {
        let third = f64_to_fixed64(1.0 / 3.0);
        let t = travel_ticks(Fixed64::ONE, third).unwrap();
        assert!(t >= CELL_TICKS * 3);
    }
}
