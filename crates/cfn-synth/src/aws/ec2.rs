//! EC2 networking constructs.
use crate::{self as synth, aws::Tag, Construct, HasDependencies, Remote, StackConstruct, Value};

/// Any IPv4 address.
pub const ANY_IPV4: &str = "0.0.0.0/0";

#[derive(Clone, Debug, PartialEq, serde::Serialize, HasDependencies)]
#[serde(rename_all = "PascalCase")]
pub struct Vpc {
    pub cidr_block: String,
    pub enable_dns_hostnames: bool,
    pub enable_dns_support: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}

impl Construct for Vpc {
    const KIND: &'static str = "AWS::EC2::VPC";
}

impl StackConstruct<Vpc> {
    pub fn vpc_id(&self) -> Remote {
        self.reference()
    }
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, HasDependencies)]
#[serde(rename_all = "PascalCase")]
pub struct InternetGateway {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}

impl Construct for InternetGateway {
    const KIND: &'static str = "AWS::EC2::InternetGateway";
}

impl StackConstruct<InternetGateway> {
    pub fn gateway_id(&self) -> Remote {
        self.reference()
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, HasDependencies)]
#[serde(rename_all = "PascalCase")]
pub struct VpcGatewayAttachment {
    pub vpc_id: Value,
    pub internet_gateway_id: Value,
}

impl Construct for VpcGatewayAttachment {
    const KIND: &'static str = "AWS::EC2::VPCGatewayAttachment";
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, HasDependencies)]
#[serde(rename_all = "PascalCase")]
pub struct Subnet {
    pub vpc_id: Value,
    pub cidr_block: String,
    pub availability_zone: Value,
    pub map_public_ip_on_launch: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}

impl Construct for Subnet {
    const KIND: &'static str = "AWS::EC2::Subnet";
}

impl StackConstruct<Subnet> {
    pub fn subnet_id(&self) -> Remote {
        self.reference()
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, HasDependencies)]
#[serde(rename_all = "PascalCase")]
pub struct RouteTable {
    pub vpc_id: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}

impl Construct for RouteTable {
    const KIND: &'static str = "AWS::EC2::RouteTable";
}

impl StackConstruct<RouteTable> {
    pub fn route_table_id(&self) -> Remote {
        self.reference()
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, HasDependencies)]
#[serde(rename_all = "PascalCase")]
pub struct Route {
    pub route_table_id: Value,
    pub destination_cidr_block: String,
    pub gateway_id: Value,
}

impl Construct for Route {
    const KIND: &'static str = "AWS::EC2::Route";
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, HasDependencies)]
#[serde(rename_all = "PascalCase")]
pub struct SubnetRouteTableAssociation {
    pub route_table_id: Value,
    pub subnet_id: Value,
}

impl Construct for SubnetRouteTableAssociation {
    const KIND: &'static str = "AWS::EC2::SubnetRouteTableAssociation";
}

/// An inbound security group rule.
///
/// The source is either an address range or another security group.
#[derive(Clone, Debug, PartialEq, serde::Serialize, HasDependencies)]
#[serde(rename_all = "PascalCase")]
pub struct Ingress {
    pub ip_protocol: String,
    pub from_port: u16,
    pub to_port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cidr_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_security_group_id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Ingress {
    pub fn tcp_from_cidr(port: u16, cidr: impl Into<String>, description: impl Into<String>) -> Self {
        Ingress {
            ip_protocol: "tcp".into(),
            from_port: port,
            to_port: port,
            cidr_ip: Some(cidr.into()),
            source_security_group_id: None,
            description: Some(description.into()),
        }
    }

    pub fn tcp_from_group(
        port: u16,
        group_id: impl Into<Value>,
        description: impl Into<String>,
    ) -> Self {
        Ingress {
            ip_protocol: "tcp".into(),
            from_port: port,
            to_port: port,
            cidr_ip: None,
            source_security_group_id: Some(group_id.into()),
            description: Some(description.into()),
        }
    }
}

/// An outbound security group rule.
#[derive(Clone, Debug, PartialEq, serde::Serialize, HasDependencies)]
#[serde(rename_all = "PascalCase")]
pub struct Egress {
    pub ip_protocol: String,
    pub cidr_ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Egress {
    pub fn all_outbound() -> Self {
        Egress {
            ip_protocol: "-1".into(),
            cidr_ip: ANY_IPV4.into(),
            description: Some("Allow all outbound traffic by default".into()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, HasDependencies)]
#[serde(rename_all = "PascalCase")]
pub struct SecurityGroup {
    pub group_description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    pub vpc_id: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub security_group_ingress: Vec<Ingress>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub security_group_egress: Vec<Egress>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}

impl Construct for SecurityGroup {
    const KIND: &'static str = "AWS::EC2::SecurityGroup";
}

impl StackConstruct<SecurityGroup> {
    pub fn group_id(&self) -> Remote {
        self.attribute("GroupId")
    }
}
