use crate::util::constants::{BYTES_IN_INT, BYTES_IN_LONG, BYTES_IN_WORD};
use crate::util::error::Result;
use crate::util::{Address, Word};

/// Read-only access to the memory of the target process.
///
/// This is the only way the inspector looks at remote data. Implementations typically go
/// through the debugger's process-control layer (ptrace, a core file, a remote debug agent).
/// Every method may fail, for instance if the page is unmapped; callers that merely probe
/// (heuristics) treat a failure as a negative answer, callers that refresh the model propagate it.
pub trait RemoteMemory {
    /// Fill `buf` with the bytes starting at `address` in the target.
    ///
    /// Arguments:
    /// * `address`: The first remote byte to read.
    /// * `buf`: The local buffer. Its length is the number of bytes to read.
    fn read_bytes(&self, address: Address, buf: &mut [u8]) -> Result<()>;

    /// Read one machine word.
    fn read_word(&self, address: Address) -> Result<Word> {
        let mut buf = [0u8; BYTES_IN_WORD];
        self.read_bytes(address, &mut buf)?;
        Ok(bytemuck::pod_read_unaligned::<Word>(&buf))
    }

    /// Read one word and interpret it as an address.
    fn read_address(&self, address: Address) -> Result<Address> {
        let mut buf = [0u8; BYTES_IN_WORD];
        self.read_bytes(address, &mut buf)?;
        Ok(bytemuck::pod_read_unaligned::<Address>(&buf))
    }

    /// Read a 32-bit integer.
    fn read_int(&self, address: Address) -> Result<i32> {
        let mut buf = [0u8; BYTES_IN_INT];
        self.read_bytes(address, &mut buf)?;
        Ok(bytemuck::pod_read_unaligned::<i32>(&buf))
    }

    /// Read a 64-bit integer.
    fn read_long(&self, address: Address) -> Result<i64> {
        let mut buf = [0u8; BYTES_IN_LONG];
        self.read_bytes(address, &mut buf)?;
        Ok(bytemuck::pod_read_unaligned::<i64>(&buf))
    }
}
