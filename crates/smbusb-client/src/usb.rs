//! USB transport over vendor control transfers.

use std::time::Duration;

use nusb::transfer::{ControlIn, ControlOut, ControlType, Recipient, TransferError};
use nusb::{DeviceInfo, MaybeFuture};
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::error::TransportError;
use crate::transport::{ControlTransport, VendorRequest};

/// Interface carrying the bus engine's control requests.
const INTERFACE_NUMBER: u8 = 0;

/// Bus engine reached through `nusb`.
#[derive(Debug)]
pub struct UsbTransport {
    device: nusb::Device,
    interface: nusb::Interface,
}

impl UsbTransport {
    /// Open the first device with the configured VID/PID.
    ///
    /// # Errors
    ///
    /// [`TransportError::NotFound`] if no device matches, or the error from
    /// opening it or claiming its interface.
    pub fn open(config: &ClientConfig) -> Result<Self, TransportError> {
        let (vid, pid) = (config.vendor_id, config.product_id);
        let dev_info = nusb::list_devices()
            .wait()
            .map_err(|e| TransportError::Other(e.to_string()))?
            .find(|d| d.vendor_id() == vid && d.product_id() == pid)
            .ok_or(TransportError::NotFound)?;
        Self::from_device_info(dev_info)
    }

    /// Open the device at a USB bus number and device address.
    ///
    /// # Errors
    ///
    /// [`TransportError::NotFound`] if nothing is attached there, or the
    /// error from opening it or claiming its interface.
    pub fn open_bus_addr(bus: u8, address: u8) -> Result<Self, TransportError> {
        let dev_info = nusb::list_devices()
            .wait()
            .map_err(|e| TransportError::Other(e.to_string()))?
            .find(|d| d.busnum() == bus && d.device_address() == address)
            .ok_or(TransportError::NotFound)?;
        Self::from_device_info(dev_info)
    }

    /// # Errors
    ///
    /// [`TransportError::Access`] if the device cannot be opened or its
    /// interface cannot be claimed.
    pub fn from_device_info(dev_info: DeviceInfo) -> Result<Self, TransportError> {
        debug!(
            bus = dev_info.busnum(),
            address = dev_info.device_address(),
            vid = format_args!("{:#06x}", dev_info.vendor_id()),
            pid = format_args!("{:#06x}", dev_info.product_id()),
            "opening device"
        );
        let device = dev_info
            .open()
            .wait()
            .map_err(|e| TransportError::Access(e.to_string()))?;
        let interface = device
            .detach_and_claim_interface(INTERFACE_NUMBER)
            .wait()
            .map_err(|e| TransportError::Access(e.to_string()))?;
        info!("bus engine interface claimed");
        Ok(Self { device, interface })
    }

    pub fn device(&self) -> &nusb::Device {
        &self.device
    }
}

fn map_transfer_error(err: TransferError) -> TransportError {
    match err {
        // nusb cancels a transfer whose timeout expires.
        TransferError::Cancelled => TransportError::Timeout,
        TransferError::Stall => TransportError::Stall,
        TransferError::Disconnected => TransportError::Disconnected,
        other => TransportError::Other(other.to_string()),
    }
}

impl ControlTransport for UsbTransport {
    fn control_in(
        &mut self,
        request: VendorRequest,
        length: u16,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        self.interface
            .control_in(
                ControlIn {
                    control_type: ControlType::Vendor,
                    recipient: Recipient::Device,
                    request: request.command.code(),
                    value: request.value,
                    index: request.index,
                    length,
                },
                timeout,
            )
            .wait()
            .map_err(map_transfer_error)
    }

    fn control_out(
        &mut self,
        request: VendorRequest,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        self.interface
            .control_out(
                ControlOut {
                    control_type: ControlType::Vendor,
                    recipient: Recipient::Device,
                    request: request.command.code(),
                    value: request.value,
                    index: request.index,
                    data,
                },
                timeout,
            )
            .wait()
            .map_err(map_transfer_error)?;
        Ok(data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_error_mapping() {
        assert_eq!(map_transfer_error(TransferError::Stall), TransportError::Stall);
        assert_eq!(map_transfer_error(TransferError::Cancelled), TransportError::Timeout);
        assert_eq!(
            map_transfer_error(TransferError::Disconnected),
            TransportError::Disconnected
        );
    }
}
