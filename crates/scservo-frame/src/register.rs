//! Register addresses in the servo control table.
//!
//! The engine passes these through as opaque codes; only the servo firmware
//! gives them meaning. Multi-byte registers are big-endian on the wire.

/// Bus id (EEPROM, 1 byte).
pub const ID: u8 = 5;

/// Position calibration offset (EEPROM, 2 bytes, sign in bit 15).
pub const OFFSET: u8 = 31;

/// Torque enable (RAM, 1 byte: 0 or 1).
pub const TORQUE_ENABLE: u8 = 40;

/// Goal acceleration (RAM, 1 byte).
pub const GOAL_ACC: u8 = 41;

/// Goal position (RAM, 2 bytes, 0..=1023).
pub const GOAL_POSITION: u8 = 42;

/// Goal time in milliseconds (RAM, 2 bytes). Directly follows [`GOAL_POSITION`].
pub const GOAL_TIME: u8 = 44;

/// EEPROM write lock (1 byte: 0 unlocked, 1 locked).
pub const LOCK: u8 = 48;

/// Present position (read-only, 2 bytes).
pub const PRESENT_POSITION: u8 = 56;

/// Returns a human-readable name for a register address.
pub fn register_name(address: u8) -> &'static str {
    match address {
        ID => "ID",
        OFFSET => "OFFSET",
        TORQUE_ENABLE => "TORQUE_ENABLE",
        GOAL_ACC => "GOAL_ACC",
        GOAL_POSITION => "GOAL_POSITION",
        GOAL_TIME => "GOAL_TIME",
        LOCK => "LOCK",
        PRESENT_POSITION => "PRESENT_POSITION",
        _ => "UNKNOWN",
    }
}

/// Returns true if writes to the register persist and need the EEPROM unlocked.
pub fn is_eeprom(address: u8) -> bool {
    matches!(address, ID | OFFSET)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_known_registers() {
        assert_eq!(register_name(GOAL_POSITION), "GOAL_POSITION");
        assert_eq!(register_name(LOCK), "LOCK");
        assert_eq!(register_name(200), "UNKNOWN");
    }

    #[test]
    fn eeprom_registers() {
        assert!(is_eeprom(ID));
        assert!(is_eeprom(OFFSET));
        assert!(!is_eeprom(GOAL_POSITION));
        assert!(!is_eeprom(LOCK));
    }
}
