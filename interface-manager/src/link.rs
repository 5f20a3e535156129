// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use futures::TryStreamExt;
use hardware::hwaddr::{Guid, Mac};
use hardware::link::LinkType;
use rtnetlink::packet_route::link::{
    LinkAttribute, LinkLayerType, LinkMessage, LinkVfInfo, State, VfInfo, VfInfoGuid, VfInfoMac,
};
use rtnetlink::{Handle, LinkUnspec};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum NetlinkError {
    #[error("failed to open netlink connection: {0}")]
    Connect(#[source] std::io::Error),
    #[error("no link named {0}")]
    NotFound(String),
    #[error("netlink request on {link} failed: {source}")]
    Request {
        link: String,
        #[source]
        source: rtnetlink::Error,
    },
    #[error("netlink reply for {0} has no interface name")]
    Unnamed(u32),
}

const ENODEV: i32 = 19;

/// True if the kernel answered `source` with "no such device".
fn is_no_such_device(source: &rtnetlink::Error) -> bool {
    match source {
        rtnetlink::Error::NetlinkError(message) => message.to_io().raw_os_error() == Some(ENODEV),
        _ => false,
    }
}

impl NetlinkError {
    fn from_request(link: &str, source: rtnetlink::Error) -> Self {
        if is_no_such_device(&source) {
            NetlinkError::NotFound(link.to_string())
        } else {
            NetlinkError::Request {
                link: link.to_string(),
                source,
            }
        }
    }
}

/// The subset of a link's netlink state relevant to SR-IOV configuration.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Link {
    pub index: u32,
    pub name: String,
    pub oper_up: bool,
    pub link_type: LinkType,
    pub address: Vec<u8>,
}

impl TryFrom<&LinkMessage> for Link {
    type Error = NetlinkError;

    fn try_from(message: &LinkMessage) -> Result<Self, Self::Error> {
        let mut name = None;
        let mut oper_up = false;
        let mut address = Vec::new();
        for attr in &message.attributes {
            match attr {
                LinkAttribute::IfName(n) => name = Some(n.clone()),
                LinkAttribute::OperState(state) => oper_up = *state == State::Up,
                LinkAttribute::Address(a) => address.clone_from(a),
                _ => {}
            }
        }
        let link_type = match message.header.link_layer_type {
            LinkLayerType::Ether => LinkType::Ethernet,
            LinkLayerType::Infiniband => LinkType::Infiniband,
            _ => LinkType::Unknown,
        };
        Ok(Link {
            index: message.header.index,
            name: name.ok_or(NetlinkError::Unnamed(message.header.index))?,
            oper_up,
            link_type,
            address,
        })
    }
}

/// A handle on the kernel's routing netlink socket.
#[derive(Clone, Debug)]
pub struct Netlink {
    handle: Handle,
}

impl Netlink {
    /// Open a netlink connection and drive it on the current tokio runtime.
    pub fn connect() -> Result<Self, NetlinkError> {
        let (connection, handle, _) = rtnetlink::new_connection().map_err(NetlinkError::Connect)?;
        tokio::spawn(connection);
        Ok(Self { handle })
    }

    #[must_use]
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    #[tracing::instrument(level = "trace", skip(self))]
    pub async fn link_by_name(&self, name: &str) -> Result<Link, NetlinkError> {
        let mut replies = self
            .handle
            .link()
            .get()
            .match_name(name.to_string())
            .execute();
        match replies.try_next().await {
            Ok(Some(message)) => Link::try_from(&message),
            Ok(None) => Err(NetlinkError::NotFound(name.to_string())),
            Err(source) => Err(NetlinkError::from_request(name, source)),
        }
    }

    async fn set(&self, link: &Link, message: LinkMessage) -> Result<(), NetlinkError> {
        self.handle
            .link()
            .set(message)
            .execute()
            .await
            .map_err(|source| NetlinkError::from_request(&link.name, source))
    }

    #[tracing::instrument(level = "debug", skip(self, link), fields(link = %link.name))]
    pub async fn set_link_up(&self, link: &Link) -> Result<(), NetlinkError> {
        self.set(link, LinkUnspec::new_with_index(link.index).up().build())
            .await?;
        debug!("set {} up", link.name);
        Ok(())
    }

    async fn set_vf_info(&self, pf: &Link, info: VfInfo) -> Result<(), NetlinkError> {
        let mut message = LinkUnspec::new_with_index(pf.index).build();
        message
            .attributes
            .push(LinkAttribute::VfInfoList(vec![LinkVfInfo(vec![info])]));
        self.set(pf, message).await
    }

    /// Set the administrative MAC address of VF `vf` of `pf`.
    #[tracing::instrument(level = "debug", skip(self, pf), fields(pf = %pf.name))]
    pub async fn set_vf_mac(&self, pf: &Link, vf: u32, mac: Mac) -> Result<(), NetlinkError> {
        self.set_vf_info(pf, VfInfo::Mac(VfInfoMac::new(vf, mac.as_ref())))
            .await
    }

    /// Set both the node and the port GUID of InfiniBand VF `vf` of `pf`.
    #[tracing::instrument(level = "debug", skip(self, pf), fields(pf = %pf.name))]
    pub async fn set_vf_guid(&self, pf: &Link, vf: u32, guid: Guid) -> Result<(), NetlinkError> {
        let raw = guid.to_u64();
        self.set_vf_info(pf, VfInfo::IbNodeGuid(VfInfoGuid::new(vf, raw)))
            .await?;
        self.set_vf_info(pf, VfInfo::IbPortGuid(VfInfoGuid::new(vf, raw)))
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::{Link, NetlinkError};
    use hardware::link::LinkType;
    use pretty_assertions::assert_eq;
    use rtnetlink::packet_core::ErrorMessage;
    use rtnetlink::packet_route::link::{LinkAttribute, LinkLayerType, LinkMessage, State};
    use std::num::NonZeroI32;

    fn nack(errno: i32) -> rtnetlink::Error {
        let mut message = ErrorMessage::default();
        message.code = NonZeroI32::new(-errno);
        rtnetlink::Error::NetlinkError(message)
    }

    #[test]
    fn no_such_device_is_not_found() {
        assert!(matches!(
            NetlinkError::from_request("ens9", nack(19)),
            NetlinkError::NotFound(name) if name == "ens9"
        ));
        assert!(matches!(
            NetlinkError::from_request("ens9", nack(1)),
            NetlinkError::Request { link, .. } if link == "ens9"
        ));
    }

    fn message(index: u32, kind: LinkLayerType, attributes: Vec<LinkAttribute>) -> LinkMessage {
        let mut message = LinkMessage::default();
        message.header.index = index;
        message.header.link_layer_type = kind;
        message.attributes = attributes;
        message
    }

    #[test]
    fn link_from_ethernet_message() {
        let msg = message(
            7,
            LinkLayerType::Ether,
            vec![
                LinkAttribute::IfName("ens1f0".into()),
                LinkAttribute::OperState(State::Up),
                LinkAttribute::Address(vec![0x0c, 0x42, 0xa1, 0, 0, 1]),
            ],
        );
        assert_eq!(
            Link::try_from(&msg).unwrap(),
            Link {
                index: 7,
                name: "ens1f0".into(),
                oper_up: true,
                link_type: LinkType::Ethernet,
                address: vec![0x0c, 0x42, 0xa1, 0, 0, 1],
            }
        );
    }

    #[test]
    fn link_from_infiniband_message() {
        let msg = message(
            9,
            LinkLayerType::Infiniband,
            vec![
                LinkAttribute::IfName("ibp59s0f0".into()),
                LinkAttribute::OperState(State::Down),
            ],
        );
        let link = Link::try_from(&msg).unwrap();
        assert_eq!(link.link_type, LinkType::Infiniband);
        assert!(!link.oper_up);
    }

    #[test]
    fn nameless_link_is_rejected() {
        let msg = message(3, LinkLayerType::Loopback, vec![]);
        assert!(matches!(Link::try_from(&msg), Err(NetlinkError::Unnamed(3))));
    }
}
