use core::fmt;
use std::net::{IpAddr, SocketAddr};

/// Identifies one peer of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MemberHandle {
    Ip(SocketAddr),
    /// A peer reachable only inside this process.
    Local(u32),
}

impl MemberHandle {
    /// Port the tools listen on unless told otherwise.
    pub const DMP_DEFAULT_PORT: u16 = 5568;

    pub fn dmp_default(addr: IpAddr) -> Self {
        Self::Ip(SocketAddr::new(addr, Self::DMP_DEFAULT_PORT))
    }

    pub fn as_socket_addr(self) -> Option<SocketAddr> {
        match self {
            Self::Ip(addr) => Some(addr),
            Self::Local(_) => None,
        }
    }
}

impl From<SocketAddr> for MemberHandle {
    fn from(addr: SocketAddr) -> Self {
        Self::Ip(addr)
    }
}

impl fmt::Display for MemberHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ip(addr) => write!(f, "{addr}"),
            Self::Local(id) => write!(f, "local:{id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::MemberHandle;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn display_forms() {
        let ip = MemberHandle::dmp_default(IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(ip.to_string(), "127.0.0.1:5568");
        assert_eq!(MemberHandle::Local(3).to_string(), "local:3");
        assert_eq!(MemberHandle::Local(3).as_socket_addr(), None);
    }
}
