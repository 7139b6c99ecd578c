//! Status light communication — trait, Linux backend, stub, and mock.

use std::fmt;

use serde::Serialize;

use crate::protocol::{self, Report};

// ── Error type ──

/// Device communication errors.
///
/// String payloads follow the convention **"context: details"** where
/// *context* names the step (e.g. `"USB open"`, `"SET_REPORT"`).
#[derive(Debug)]
pub enum DeviceError {
    NotFound,
    OpenFailed(String),
    WriteFailed(String),
    ReadFailed(String),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::NotFound => write!(f, "blink(1) device not found"),
            DeviceError::OpenFailed(e) => write!(f, "Failed to open device: {e}"),
            DeviceError::WriteFailed(e) => write!(f, "Report write failed: {e}"),
            DeviceError::ReadFailed(e) => write!(f, "Report read failed: {e}"),
        }
    }
}

impl std::error::Error for DeviceError {}

pub type Result<T> = std::result::Result<T, DeviceError>;

// ── Device info ──

#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    /// Bus location, e.g. `usb:001/004`.
    pub path: String,
    /// USB product string.
    pub product: String,
    pub serial: Option<String>,
    /// Firmware version as reported by the `'v'` command (e.g. 204 for v2.04).
    pub firmware: Option<u16>,
}

impl DeviceInfo {
    /// Human-readable firmware version.
    pub fn firmware_label(&self) -> String {
        match self.firmware {
            Some(v) => format!("v{}.{:02}", v / 100, v % 100),
            None => "unknown".into(),
        }
    }

    /// mk1 devices (firmware 1xx) have a single LED and ignore `ledn`.
    pub fn has_two_leds(&self) -> bool {
        self.firmware.is_none_or(|v| v >= 200)
    }
}

// ── Trait ──

pub trait StatusLight {
    fn open() -> Result<Self>
    where
        Self: Sized;
    fn info(&self) -> &DeviceInfo;
    /// Send one feature report.
    fn send_report(&self, report: &Report) -> Result<()>;
    /// Read back the pending feature report (reply to `'v'` or `'R'`).
    fn read_report(&self) -> Result<Report>;
}

// ── Linux implementation ──

#[cfg(target_os = "linux")]
mod linux_impl {
    use super::*;
    use std::time::Duration;

    use nusb::transfer::{Control, ControlType, Recipient};

    use crate::protocol::{
        BLINK1_PID, BLINK1_VID, HID_FEATURE_REPORT, HID_GET_REPORT, HID_INTERFACE,
        HID_SET_REPORT, REPORT_SIZE, USB_TIMEOUT_MS,
    };

    pub struct LinuxDevice {
        interface: nusb::Interface,
        info: DeviceInfo,
    }

    fn feature_control(request: u8) -> Control {
        Control {
            control_type: ControlType::Class,
            recipient: Recipient::Interface,
            request,
            value: HID_FEATURE_REPORT,
            index: HID_INTERFACE as u16,
        }
    }

    pub(super) fn is_blink1(dev: &nusb::DeviceInfo) -> bool {
        dev.vendor_id() == BLINK1_VID && dev.product_id() == BLINK1_PID
    }

    pub(super) fn bus_path(dev: &nusb::DeviceInfo) -> String {
        format!("usb:{:03}/{:03}", dev.bus_number(), dev.device_address())
    }

    impl LinuxDevice {
        /// Open the first blink(1), or the one whose serial matches.
        pub fn open_matching(serial: Option<&str>) -> Result<Self> {
            let device_info = nusb::list_devices()
                .map_err(|e| DeviceError::OpenFailed(format!("USB enumeration: {e}")))?
                .filter(is_blink1)
                .find(|dev| match serial {
                    None => true,
                    Some(want) => dev
                        .serial_number()
                        .is_some_and(|s| s.eq_ignore_ascii_case(want)),
                })
                .ok_or(DeviceError::NotFound)?;

            let path = bus_path(&device_info);
            let product = device_info
                .product_string()
                .unwrap_or("blink(1)")
                .to_string();
            let serial = device_info.serial_number().map(|s| s.to_string());

            let usb_device = device_info
                .open()
                .map_err(|e| DeviceError::OpenFailed(format!("USB open: {e}")))?;

            // usbhid owns the interface by default
            let interface = usb_device
                .detach_and_claim_interface(HID_INTERFACE)
                .map_err(|e| {
                    DeviceError::OpenFailed(format!("claim interface {HID_INTERFACE}: {e}"))
                })?;

            let mut dev = LinuxDevice {
                interface,
                info: DeviceInfo {
                    path,
                    product,
                    serial,
                    firmware: None,
                },
            };

            if dev.send_report(&protocol::get_version()).is_ok()
                && let Ok(reply) = dev.read_report()
            {
                dev.info.firmware = protocol::parse_version(&reply);
            }

            Ok(dev)
        }
    }

    impl StatusLight for LinuxDevice {
        fn open() -> Result<Self> {
            Self::open_matching(None)
        }

        fn info(&self) -> &DeviceInfo {
            &self.info
        }

        fn send_report(&self, report: &Report) -> Result<()> {
            self.interface
                .control_out_blocking(
                    feature_control(HID_SET_REPORT),
                    report,
                    Duration::from_millis(USB_TIMEOUT_MS),
                )
                .map_err(|e| DeviceError::WriteFailed(format!("SET_REPORT: {e}")))?;
            Ok(())
        }

        fn read_report(&self) -> Result<Report> {
            let mut buf = [0u8; REPORT_SIZE];
            let n = self
                .interface
                .control_in_blocking(
                    feature_control(HID_GET_REPORT),
                    &mut buf,
                    Duration::from_millis(USB_TIMEOUT_MS),
                )
                .map_err(|e| DeviceError::ReadFailed(format!("GET_REPORT: {e}")))?;
            if n < REPORT_SIZE {
                return Err(DeviceError::ReadFailed(format!(
                    "GET_REPORT: short reply ({n} of {REPORT_SIZE} bytes)"
                )));
            }
            Ok(buf)
        }
    }
}

#[cfg(target_os = "linux")]
pub use linux_impl::LinuxDevice;

// ── Stub device for unsupported platforms ──

/// Placeholder device that always returns `NotFound`.
#[cfg(not(target_os = "linux"))]
pub struct StubDevice;

#[cfg(not(target_os = "linux"))]
impl StatusLight for StubDevice {
    fn open() -> Result<Self> {
        Err(DeviceError::NotFound)
    }
    fn info(&self) -> &DeviceInfo {
        unreachable!()
    }
    fn send_report(&self, _report: &Report) -> Result<()> {
        unreachable!()
    }
    fn read_report(&self) -> Result<Report> {
        unreachable!()
    }
}

// ── Device enumeration ──

/// A blink(1) seen on the bus (not opened).
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredDevice {
    pub path: String,
    pub serial: Option<String>,
}

/// List attached blink(1) devices. Empty on unsupported platforms.
pub fn enumerate_devices() -> Vec<DiscoveredDevice> {
    #[cfg(target_os = "linux")]
    {
        let Ok(devices) = nusb::list_devices() else {
            return Vec::new();
        };
        devices
            .filter(linux_impl::is_blink1)
            .map(|dev| DiscoveredDevice {
                path: linux_impl::bus_path(&dev),
                serial: dev.serial_number().map(|s| s.to_string()),
            })
            .collect()
    }
    #[cfg(not(target_os = "linux"))]
    {
        Vec::new()
    }
}

#[cfg(target_os = "linux")]
pub type PlatformDevice = LinuxDevice;
#[cfg(not(target_os = "linux"))]
pub type PlatformDevice = StubDevice;

/// Open the first blink(1) found.
pub fn open_device() -> Result<PlatformDevice> {
    PlatformDevice::open()
}

/// Open the blink(1) with the given serial. Empty serial = first device.
pub fn open_device_by_serial(serial: &str) -> Result<PlatformDevice> {
    let serial = serial.trim();
    if serial.is_empty() {
        return open_device();
    }
    #[cfg(target_os = "linux")]
    {
        LinuxDevice::open_matching(Some(serial)).map_err(|e| match e {
            DeviceError::NotFound => {
                let available: Vec<String> = enumerate_devices()
                    .into_iter()
                    .map(|d| d.serial.unwrap_or_else(|| "(no serial)".into()))
                    .collect();
                if available.is_empty() {
                    DeviceError::NotFound
                } else {
                    DeviceError::OpenFailed(format!(
                        "no device with serial '{serial}' found (available: {})",
                        available.join(", ")
                    ))
                }
            }
            other => other,
        })
    }
    #[cfg(not(target_os = "linux"))]
    {
        Err(DeviceError::NotFound)
    }
}

// ── Mock device for testing ──

/// In-memory device for unit and integration tests.
#[doc(hidden)]
pub mod mock {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    use crate::led::Rgb;
    use crate::protocol::CMD_FADE_TO_RGB;

    /// Records every report sent; replays queued replies on read.
    pub struct MockLight {
        info: DeviceInfo,
        pub reports: RefCell<Vec<Report>>,
        pub replies: RefCell<VecDeque<Report>>,
        /// If true, `send_report` returns an error.
        pub fail_send: Cell<bool>,
    }

    /// A decoded fade command.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Fade {
        pub color: Rgb,
        pub fade_ms: u32,
        pub ledn: u8,
    }

    impl Default for MockLight {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MockLight {
        pub fn new() -> Self {
            MockLight {
                info: DeviceInfo {
                    path: "mock://blink1".into(),
                    product: "blink(1) mk3".into(),
                    serial: Some("3a1b2c3d".into()),
                    firmware: Some(302),
                },
                reports: RefCell::new(Vec::new()),
                replies: RefCell::new(VecDeque::new()),
                fail_send: Cell::new(false),
            }
        }

        pub fn info_mut(&mut self) -> &mut DeviceInfo {
            &mut self.info
        }

        pub fn push_reply(&self, reply: Report) {
            self.replies.borrow_mut().push_back(reply);
        }

        /// All fade commands sent so far, in order.
        pub fn fades(&self) -> Vec<Fade> {
            self.reports
                .borrow()
                .iter()
                .filter(|r| r[1] == CMD_FADE_TO_RGB)
                .map(|r| Fade {
                    color: Rgb::new(r[2], r[3], r[4]),
                    fade_ms: u16::from_be_bytes([r[5], r[6]]) as u32 * 10,
                    ledn: r[7],
                })
                .collect()
        }

        /// Reports with the given command byte.
        pub fn reports_with(&self, cmd: u8) -> Vec<Report> {
            self.reports
                .borrow()
                .iter()
                .filter(|r| r[1] == cmd)
                .copied()
                .collect()
        }
    }

    impl StatusLight for MockLight {
        fn open() -> Result<Self> {
            Ok(Self::new())
        }

        fn info(&self) -> &DeviceInfo {
            &self.info
        }

        fn send_report(&self, report: &Report) -> Result<()> {
            if self.fail_send.get() {
                return Err(DeviceError::WriteFailed(
                    "mock: send_report failure injected".into(),
                ));
            }
            self.reports.borrow_mut().push(*report);
            Ok(())
        }

        fn read_report(&self) -> Result<Report> {
            self.replies
                .borrow_mut()
                .pop_front()
                .ok_or_else(|| DeviceError::ReadFailed("mock: no reply queued".into()))
        }
    }
}
