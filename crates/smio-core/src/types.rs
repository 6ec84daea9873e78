use bitflags::bitflags;

/// Offset type used for global element ids, dimension sizes, and record
/// frames. Signed so that negative values can carry sentinel meanings
/// (unlimited dimension size, absent attribute length).
pub type Offset = i64;

/// Type of a variable or attribute stored in a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarType {
    Real32,
    Real64,
    Int32,
    Char,
    Unknown,
}

impl VarType {
    /// Size in bytes of one scalar value of this type.
    pub fn size(&self) -> usize {
        match self {
            VarType::Real32 => 4,
            VarType::Real64 => 8,
            VarType::Int32 => 4,
            VarType::Char => 1,
            VarType::Unknown => 1,
        }
    }

    /// Stable integer encoding, used when broadcasting a type across ranks.
    pub fn code(&self) -> i32 {
        match self {
            VarType::Real32 => 0,
            VarType::Real64 => 1,
            VarType::Int32 => 2,
            VarType::Char => 3,
            VarType::Unknown => 4,
        }
    }

    pub fn from_code(code: i32) -> VarType {
        match code {
            0 => VarType::Real32,
            1 => VarType::Real64,
            2 => VarType::Int32,
            3 => VarType::Char,
            _ => VarType::Unknown,
        }
    }
}

bitflags! {
    /// File access mode. At least one flag must be set; `CREATE` and `READ`
    /// are mutually exclusive.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FileMode: u32 {
        /// Create a new file, clobbering any existing one
        const CREATE = 0x01;
        /// Open an existing file for writing
        const WRITE  = 0x02;
        /// Open an existing file read-only
        const READ   = 0x04;
    }
}

impl FileMode {
    /// Whether this mode allows writing (and therefore needs an attached
    /// backend buffer).
    pub fn writable(&self) -> bool {
        self.intersects(FileMode::CREATE | FileMode::WRITE)
    }

    /// Validate the flag combination.
    pub fn is_valid(&self) -> bool {
        !self.is_empty() && !self.contains(FileMode::CREATE | FileMode::READ)
    }
}

/// Typed attribute value. Character attributes take their length from the
/// string; all other types have length one.
#[derive(Debug, Clone, PartialEq)]
pub enum AttValue {
    Real32(f32),
    Real64(f64),
    Int32(i32),
    Char(String),
}

impl AttValue {
    pub fn var_type(&self) -> VarType {
        match self {
            AttValue::Real32(_) => VarType::Real32,
            AttValue::Real64(_) => VarType::Real64,
            AttValue::Int32(_) => VarType::Int32,
            AttValue::Char(_) => VarType::Char,
        }
    }

    /// Attribute length in scalar units.
    pub fn len(&self) -> Offset {
        match self {
            AttValue::Char(s) => s.len() as Offset,
            _ => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Native byte encoding of the value.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            AttValue::Real32(v) => v.to_ne_bytes().to_vec(),
            AttValue::Real64(v) => v.to_ne_bytes().to_vec(),
            AttValue::Int32(v) => v.to_ne_bytes().to_vec(),
            AttValue::Char(s) => s.as_bytes().to_vec(),
        }
    }

    /// Decode a value of the given type from its native byte encoding.
    pub fn from_bytes(vtype: VarType, bytes: &[u8]) -> Option<AttValue> {
        match vtype {
            VarType::Real32 => Some(AttValue::Real32(f32::from_ne_bytes(
                bytes.try_into().ok()?,
            ))),
            VarType::Real64 => Some(AttValue::Real64(f64::from_ne_bytes(
                bytes.try_into().ok()?,
            ))),
            VarType::Int32 => Some(AttValue::Int32(i32::from_ne_bytes(
                bytes.try_into().ok()?,
            ))),
            VarType::Char => Some(AttValue::Char(String::from_utf8(bytes.to_vec()).ok()?)),
            VarType::Unknown => None,
        }
    }
}

/// View a slice of plain values as raw bytes.
pub fn as_bytes<T: Copy>(s: &[T]) -> &[u8] {
    // Safety: T is Copy (plain data), and the byte length is exactly the
    // slice's memory footprint.
    unsafe { std::slice::from_raw_parts(s.as_ptr() as *const u8, std::mem::size_of_val(s)) }
}

/// View a mutable slice of plain values as raw bytes.
pub fn as_bytes_mut<T: Copy>(s: &mut [T]) -> &mut [u8] {
    // Safety: as above; exclusive access is inherited from the input borrow.
    unsafe { std::slice::from_raw_parts_mut(s.as_mut_ptr() as *mut u8, std::mem::size_of_val(s)) }
}
