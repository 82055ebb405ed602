// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Minimal I²C access through the Linux `i2c-dev` interface.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::io::AsRawFd;

/// `ioctl` request selecting the slave address for subsequent reads/writes.
const I2C_SLAVE: libc::c_ulong = 0x0703;

/// Register-level access to one I²C device.
pub trait I2cBus: Send {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    fn read(&mut self, buf: &mut [u8]) -> io::Result<()>;

    fn write_register(&mut self, reg: u8, value: u8) -> io::Result<()> {
        self.write(&[reg, value])
    }

    /// Read `buf.len()` bytes starting at `reg` (auto-increment).
    fn read_registers(&mut self, reg: u8, buf: &mut [u8]) -> io::Result<()> {
        self.write(&[reg])?;
        self.read(buf)
    }

    fn read_register(&mut self, reg: u8) -> io::Result<u8> {
        let mut buf = [0u8; 1];
        self.read_registers(reg, &mut buf)?;
        Ok(buf[0])
    }
}

/// `/dev/i2c-N` bound to one slave address.
pub struct LinuxI2c {
    file: File,
}

impl LinuxI2c {
    pub fn open(bus: u8, address: u16) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(format!("/dev/i2c-{}", bus))?;

        // SAFETY: fd is a valid open i2c-dev descriptor; I2C_SLAVE takes the
        // address by value and touches no user memory.
        let rc = unsafe {
            libc::ioctl(
                file.as_raw_fd(),
                I2C_SLAVE as _,
                libc::c_ulong::from(address),
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self { file })
    }
}

impl I2cBus for LinuxI2c {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file.write_all(bytes)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.file.read_exact(buf)
    }
}

/// In-memory register file for driver tests.
#[cfg(test)]
pub(crate) mod fake {
    use super::I2cBus;
    use std::io;

    pub struct FakeBus {
        pub registers: [u8; 256],
        pub writes: Vec<(u8, u8)>,
        pointer: u8,
    }

    impl FakeBus {
        pub fn new() -> Self {
            Self {
                registers: [0; 256],
                writes: Vec::new(),
                pointer: 0,
            }
        }

        pub fn set(&mut self, reg: u8, bytes: &[u8]) {
            for (i, b) in bytes.iter().enumerate() {
                self.registers[reg as usize + i] = *b;
            }
        }
    }

    impl I2cBus for FakeBus {
        fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
            match bytes {
                [reg] => self.pointer = *reg,
                [reg, rest @ ..] => {
                    for (i, b) in rest.iter().enumerate() {
                        let addr = reg.wrapping_add(i as u8);
                        self.registers[addr as usize] = *b;
                        self.writes.push((addr, *b));
                    }
                }
                [] => {}
            }
            Ok(())
        }

        fn read(&mut self, buf: &mut [u8]) -> io::Result<()> {
            for b in buf.iter_mut() {
                *b = self.registers[self.pointer as usize];
                self.pointer = self.pointer.wrapping_add(1);
            }
            Ok(())
        }
    }
}
