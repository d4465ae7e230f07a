//! Messages sent over Tor's link protocol: everything is framed as a
//! "cell", either fixed-length (padded to 514 bytes on link version 4)
//! or variable-length with a two-byte length prefix.

pub mod codec;
pub mod msg;

use crate::{Error, Result};

/// The amount of data sent in a fixed-length cell.
///
/// Historically, this was set at 509 bytes so that cells would be
/// exactly 512 bytes long once the 2-byte circuit id and 1-byte
/// command of link version 3 were added; the version-4 header is two
/// bytes wider but the payload size never changed.
pub const CELL_DATA_LEN: usize = 509;

/// The body of a fixed-length cell, as an unparsed byte array.
pub type RawCellBody = [u8; CELL_DATA_LEN];

/// Identifies the circuit that a cell belongs to.  Zero denotes a
/// cell that applies to the link as a whole.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CircId(u32);

impl From<u32> for CircId {
    fn from(v: u32) -> CircId {
        CircId(v)
    }
}
impl From<CircId> for u32 {
    fn from(id: CircId) -> u32 {
        id.0
    }
}
impl std::fmt::Display for CircId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
impl CircId {
    /// Return true if this is the zero circuit id, used by messages
    /// that apply to the link rather than to any one circuit.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

/// A link-protocol command, identifying what kind of cell follows.
///
/// This is a closed set: commands we have no decoder for become
/// [`msg::Unrecognized`] rather than an error, since an unknown cell
/// must be droppable without killing the link.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum CellCmd {
    /// Fixed-length padding.
    Padding,
    /// Relay cell, transmitted over a circuit.
    Relay,
    /// Tear down a circuit.
    Destroy,
    /// Negotiate the link protocol version.
    Versions,
    /// Tell the other side of the link about our view of the
    /// connection's addresses and time.
    Netinfo,
    /// Relay cell that may be used to extend a circuit.
    RelayEarly,
    /// Extend a circuit to a new hop (client side: create the first
    /// hop of a circuit).
    Create2,
    /// Reply to a Create2.
    Created2,
    /// Variable-length padding.
    Vpadding,
    /// Certificates that prove the link's keys.
    Certs,
    /// Challenge used as part of link authentication.
    AuthChallenge,
    /// Response used as part of link authentication.
    Authenticate,
}

impl CellCmd {
    /// Return the numeric value of this command on the wire.
    pub fn value(self) -> u8 {
        match self {
            CellCmd::Padding => 0,
            CellCmd::Relay => 3,
            CellCmd::Destroy => 4,
            CellCmd::Versions => 7,
            CellCmd::Netinfo => 8,
            CellCmd::RelayEarly => 9,
            CellCmd::Create2 => 10,
            CellCmd::Created2 => 11,
            CellCmd::Vpadding => 128,
            CellCmd::Certs => 129,
            CellCmd::AuthChallenge => 130,
            CellCmd::Authenticate => 131,
        }
    }
    /// Try to convert a wire command byte into a known command.
    pub fn from_value(v: u8) -> Option<CellCmd> {
        match v {
            0 => Some(CellCmd::Padding),
            3 => Some(CellCmd::Relay),
            4 => Some(CellCmd::Destroy),
            7 => Some(CellCmd::Versions),
            8 => Some(CellCmd::Netinfo),
            9 => Some(CellCmd::RelayEarly),
            10 => Some(CellCmd::Create2),
            11 => Some(CellCmd::Created2),
            128 => Some(CellCmd::Vpadding),
            129 => Some(CellCmd::Certs),
            130 => Some(CellCmd::AuthChallenge),
            131 => Some(CellCmd::Authenticate),
            _ => None,
        }
    }
}

/// Return true if the given command byte uses variable-length
/// framing: VERSIONS, plus every command of 128 or above.
pub(crate) fn cmd_is_var(cmd: u8) -> bool {
    cmd == CellCmd::Versions.value() || cmd >= 128
}

/// Check whether the command byte `cmd` may appear with the circuit
/// id `circid`.  Circuit-level commands require a nonzero id;
/// link-level commands require zero.
pub(crate) fn check_circid(cmd: u8, circid: CircId) -> Result<()> {
    let cmd = match CellCmd::from_value(cmd) {
        Some(c) => c,
        // Unknown commands travel as Unrecognized, and their circuit
        // id is unconstrained.
        None => return Ok(()),
    };
    let want_circid = matches!(
        cmd,
        CellCmd::Relay
            | CellCmd::RelayEarly
            | CellCmd::Destroy
            | CellCmd::Create2
            | CellCmd::Created2
    );
    if want_circid && circid.is_zero() {
        Err(Error::BadCircId("circuit-level command with zero circuit id"))
    } else if !want_circid && !circid.is_zero() {
        Err(Error::BadCircId("link-level command with nonzero circuit id"))
    } else {
        Ok(())
    }
}

/// A single link-protocol cell: a message plus the circuit id it was
/// sent on.
#[derive(Debug)]
pub struct Cell {
    /// Which circuit (zero for link-level messages).
    circid: CircId,
    /// The cell's contents.
    msg: msg::CellMsg,
}

impl Cell {
    /// Construct a new cell.
    pub fn new<M>(circid: CircId, msg: M) -> Self
    where
        M: Into<msg::CellMsg>,
    {
        Cell {
            circid,
            msg: msg.into(),
        }
    }
    /// Return the circuit id for this cell.
    pub fn circid(&self) -> CircId {
        self.circid
    }
    /// Return a reference to this cell's message.
    pub fn msg(&self) -> &msg::CellMsg {
        &self.msg
    }
    /// Consume this cell and return its components.
    pub fn into_circid_and_msg(self) -> (CircId, msg::CellMsg) {
        (self.circid, self.msg)
    }
}
