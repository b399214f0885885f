use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// Serde uses the same strings, so the wire format matches storage.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(TrackerStatus {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
});

str_enum!(ReminderStatus {
    Pending => "Pending",
    Taken => "Taken",
    Missed => "Missed",
});

str_enum!(Slot {
    Morning => "morning",
    Afternoon => "afternoon",
    Night => "night",
});

str_enum!(Role {
    Patient => "patient",
    Doctor => "doctor",
    Admin => "admin",
});

impl Slot {
    /// Fixed wall-clock hour of the dose slot (deployment local time).
    pub fn hour(&self) -> u32 {
        match self {
            Slot::Morning => 8,
            Slot::Afternoon => 14,
            Slot::Night => 20,
        }
    }

    /// All slots in dosing order. The order is the tiebreak for
    /// reminders on the same calendar day.
    pub const ALL: [Slot; 3] = [Slot::Morning, Slot::Afternoon, Slot::Night];
}

impl ReminderStatus {
    /// Taken and Missed are terminal; only Pending can transition.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReminderStatus::Pending)
    }
}
