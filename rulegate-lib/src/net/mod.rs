pub mod access_list;
pub mod address;
pub mod cidr;

pub use access_list::AccessLists;
pub use address::{parse_address, parse_ipv4, parse_ipv6};
pub use cidr::{AddressFamilyError, CidrBlock, CidrError};
