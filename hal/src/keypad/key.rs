use crate::keypad::{KEYPAD_COLS, KEYPAD_ROWS};

/// Represents the keys on a 4x4 keypad.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum KeypadKey {
    /// The `1` key.
    Key1,
    /// The `2` key.
    Key2,
    /// The `3` key.
    Key3,
    /// The `4` key.
    Key4,
    /// The `5` key.
    Key5,
    /// The `6` key.
    Key6,
    /// The `7` key.
    Key7,
    /// The `8` key.
    Key8,
    /// The `9` key.
    Key9,
    /// The `0` key.
    Key0,
    /// The `*` key.
    KeyAsterisk,
    /// The `#` key.
    KeyHash,
    /// The `A` key.
    KeyA,
    /// The `B` key.
    KeyB,
    /// The `C` key.
    KeyC,
    /// The `D` key.
    KeyD,
}

use KeypadKey::*;

/// Physical layout of the keypad, indexed by `[row][column]`.
pub const KEYPAD_LAYOUT: [[KeypadKey; KEYPAD_COLS]; KEYPAD_ROWS] = [
    [Key1, Key2, Key3, KeyA],
    [Key4, Key5, Key6, KeyB],
    [Key7, Key8, Key9, KeyC],
    [KeyAsterisk, Key0, KeyHash, KeyD],
];

impl KeypadKey {
    /// Converts a position (row, column) to a [KeypadKey].
    pub fn from_position(row: usize, col: usize) -> Option<KeypadKey> {
        KEYPAD_LAYOUT.get(row)?.get(col).copied()
    }

    /// Finds the (row, column) position of the key.
    pub fn position(self) -> (usize, usize) {
        KEYPAD_LAYOUT
            .iter()
            .enumerate()
            .find_map(|(row, keys)| keys.iter().position(|&k| k == self).map(|col| (row, col)))
            .unwrap_or_else(|| unreachable!("every key is in the layout"))
    }

    /// Converts the [KeypadKey] to its corresponding character.
    pub fn to_char(self) -> char {
        match self {
            Key1 => '1',
            Key2 => '2',
            Key3 => '3',
            Key4 => '4',
            Key5 => '5',
            Key6 => '6',
            Key7 => '7',
            Key8 => '8',
            Key9 => '9',
            Key0 => '0',
            KeyAsterisk => '*',
            KeyHash => '#',
            KeyA => 'A',
            KeyB => 'B',
            KeyC => 'C',
            KeyD => 'D',
        }
    }

    /// The ASCII byte sent over the wire for this key.
    pub fn to_byte(self) -> u8 {
        self.to_char() as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn layout_reads_row_by_row() {
        let chars: String = KEYPAD_LAYOUT.iter().flatten().map(|k| k.to_char()).collect();
        assert_eq!(chars, "123A456B789C*0#D");
    }

    #[test]
    fn layout_has_no_duplicates() {
        let keys: HashSet<_> = KEYPAD_LAYOUT.iter().flatten().collect();
        assert_eq!(keys.len(), KEYPAD_ROWS * KEYPAD_COLS);
    }

    #[test]
    fn position_round_trips() {
        assert_eq!(Key8.position(), (2, 1));
        assert_eq!(KeypadKey::from_position(3, 3), Some(KeyD));
        assert_eq!(KeypadKey::from_position(4, 0), None);
        assert_eq!(KeypadKey::from_position(0, 4), None);
    }
}
