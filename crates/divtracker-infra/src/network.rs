//! The virtual network: subnets, routing and the two security groups.
use snafu::prelude::*;
use synth::{
    aws::{
        ec2::{
            Egress, Ingress, InternetGateway, Route, RouteTable, SecurityGroup, Subnet,
            SubnetRouteTableAssociation, Vpc, VpcGatewayAttachment, ANY_IPV4,
        },
        Tag,
    },
    Stack, StackConstruct, Value,
};

use crate::{
    config::Profile,
    error::{CidrExhaustedSnafu, InvalidCidrSnafu, Result},
};

/// An IPv4 block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cidr {
    base: u32,
    prefix: u8,
}

impl std::str::FromStr for Cidr {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || InvalidCidrSnafu { cidr: s }.build();
        let (address, prefix) = s.split_once('/').ok_or_else(invalid)?;
        let address: std::net::Ipv4Addr = address.parse().map_err(|_| invalid())?;
        let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
        ensure!(prefix <= 32, InvalidCidrSnafu { cidr: s });
        let base = u32::from(address) & mask(prefix);
        Ok(Cidr { base, prefix })
    }
}

impl std::fmt::Display for Cidr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", std::net::Ipv4Addr::from(self.base), self.prefix)
    }
}

fn mask(prefix: u8) -> u32 {
    u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0)
}

impl Cidr {
    /// Carves `count` consecutive blocks of `/prefix` out of this one.
    pub fn subnets(&self, prefix: u8, count: usize) -> Result<Vec<Cidr>> {
        let exhausted = || {
            CidrExhaustedSnafu {
                cidr: self.to_string(),
                count,
                prefix,
            }
            .build()
        };
        if prefix < self.prefix || prefix > 32 {
            return Err(exhausted());
        }
        let available = 1u64 << (prefix - self.prefix);
        if count as u64 > available {
            return Err(exhausted());
        }
        let step = 1u64 << (32 - prefix);
        Ok((0..count as u64)
            .map(|i| Cidr {
                base: (u64::from(self.base) + i * step) as u32,
                prefix,
            })
            .collect())
    }
}

/// Handles to the network constructs needed downstream.
pub struct NetworkTopology {
    pub vpc: StackConstruct<Vpc>,
    /// In availability zone order.
    pub public_subnets: Vec<StackConstruct<Subnet>>,
    /// In availability zone order.
    pub isolated_subnets: Vec<StackConstruct<Subnet>>,
    pub app_security_group: StackConstruct<SecurityGroup>,
    pub data_security_group: StackConstruct<SecurityGroup>,
}

impl NetworkTopology {
    /// The public subnet ids joined by commas, in availability zone order.
    pub fn public_subnet_ids(&self) -> Value {
        Value::join(
            ",",
            self.public_subnets.iter().map(|s| Value::from(s.subnet_id())),
        )
    }

    pub fn isolated_subnet_ids(&self) -> Vec<Value> {
        self.isolated_subnets
            .iter()
            .map(|s| Value::from(s.subnet_id()))
            .collect()
    }
}

enum Tier {
    Public,
    Isolated,
}

impl Tier {
    fn label(&self) -> &'static str {
        match self {
            Tier::Public => "Public",
            Tier::Isolated => "Isolated",
        }
    }
}

fn subnet(
    stack: &mut Stack,
    profile: &Profile,
    vpc: &StackConstruct<Vpc>,
    gateway: Option<(&StackConstruct<InternetGateway>, &StackConstruct<VpcGatewayAttachment>)>,
    tier: Tier,
    az: u32,
    cidr: Cidr,
) -> Result<StackConstruct<Subnet>> {
    let id = format!("{}Subnet{}", tier.label(), az + 1);
    let name = format!("{}/{id}", profile.qualified_name());
    let subnet = stack.construct(
        &id,
        Subnet {
            vpc_id: vpc.vpc_id().into(),
            cidr_block: cidr.to_string(),
            availability_zone: Value::AvailabilityZone(az),
            map_public_ip_on_launch: matches!(tier, Tier::Public),
            tags: vec![Tag::name(name.as_str())],
        },
    )?;
    let table = stack.construct(
        format!("{id}RouteTable"),
        RouteTable {
            vpc_id: vpc.vpc_id().into(),
            tags: vec![Tag::name(name.as_str())],
        },
    )?;
    stack.construct(
        format!("{id}RouteTableAssociation"),
        SubnetRouteTableAssociation {
            route_table_id: table.route_table_id().into(),
            subnet_id: subnet.subnet_id().into(),
        },
    )?;
    if let Some((gateway, attachment)) = gateway {
        let route = stack.construct(
            format!("{id}DefaultRoute"),
            Route {
                route_table_id: table.route_table_id().into(),
                destination_cidr_block: ANY_IPV4.into(),
                gateway_id: gateway.gateway_id().into(),
            },
        )?;
        // The route only resolves once the gateway is attached.
        stack.add_dependency(&route, attachment)?;
    }
    Ok(subnet)
}

/// Declares the network of the backend.
///
/// Subnet blocks are handed out in order, public subnets first. There are no
/// NAT gateways, so isolated subnets cannot reach the internet.
pub fn build(stack: &mut Stack, profile: &Profile) -> Result<NetworkTopology> {
    let network = &profile.network;
    let vpc_cidr: Cidr = network.vpc_cidr.parse()?;
    let azs = network.max_azs as usize;
    let blocks = vpc_cidr.subnets(network.subnet_prefix, azs * 2)?;
    let (public_blocks, isolated_blocks) = blocks.split_at(azs);

    let vpc = stack.construct(
        "Vpc",
        Vpc {
            cidr_block: vpc_cidr.to_string(),
            enable_dns_hostnames: true,
            enable_dns_support: true,
            tags: vec![Tag::name(profile.stage_scoped("vpc"))],
        },
    )?;
    let gateway = stack.construct(
        "InternetGateway",
        InternetGateway {
            tags: vec![Tag::name(profile.stage_scoped("igw"))],
        },
    )?;
    let attachment = stack.construct(
        "VpcGatewayAttachment",
        VpcGatewayAttachment {
            vpc_id: vpc.vpc_id().into(),
            internet_gateway_id: gateway.gateway_id().into(),
        },
    )?;

    let mut public_subnets = vec![];
    for (az, block) in public_blocks.iter().enumerate() {
        public_subnets.push(subnet(
            stack,
            profile,
            &vpc,
            Some((&gateway, &attachment)),
            Tier::Public,
            az as u32,
            *block,
        )?);
    }
    let mut isolated_subnets = vec![];
    for (az, block) in isolated_blocks.iter().enumerate() {
        isolated_subnets.push(subnet(
            stack,
            profile,
            &vpc,
            None,
            Tier::Isolated,
            az as u32,
            *block,
        )?);
    }

    let app_security_group = stack.construct(
        "AppSecurityGroup",
        SecurityGroup {
            group_description: "Security group for the Elastic Beanstalk application".into(),
            group_name: Some(profile.app_scoped("app-sg")),
            vpc_id: vpc.vpc_id().into(),
            security_group_ingress: vec![
                Ingress::tcp_from_cidr(80, ANY_IPV4, "Allow HTTP traffic"),
                Ingress::tcp_from_cidr(443, ANY_IPV4, "Allow HTTPS traffic"),
            ],
            security_group_egress: vec![Egress::all_outbound()],
            tags: vec![],
        },
    )?;
    let data_security_group = stack.construct(
        "DatabaseSecurityGroup",
        SecurityGroup {
            group_description: "Security group for the RDS PostgreSQL database".into(),
            group_name: Some(profile.app_scoped("rds-sg")),
            vpc_id: vpc.vpc_id().into(),
            security_group_ingress: vec![Ingress::tcp_from_group(
                profile.database.port,
                app_security_group.group_id(),
                "Allow PostgreSQL access from the application",
            )],
            security_group_egress: vec![Egress::all_outbound()],
            tags: vec![],
        },
    )?;

    Ok(NetworkTopology {
        vpc,
        public_subnets,
        isolated_subnets,
        app_security_group,
        data_security_group,
    })
}
