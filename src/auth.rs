use ulid::Ulid;

use crate::engine::EngineError;

/// Role attached to an authenticated caller by the surrounding auth layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Patient,
    Doctor,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Doctor => "doctor",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who is asking. For patients `id` becomes the booking's patient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub id: Ulid,
    pub role: Role,
}

impl Caller {
    pub fn new(id: Ulid, role: Role) -> Self {
        Self { id, role }
    }

    pub fn patient(id: Ulid) -> Self {
        Self::new(id, Role::Patient)
    }

    pub fn admin(id: Ulid) -> Self {
        Self::new(id, Role::Admin)
    }
}

/// Lifecycle mutations that are role-gated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Schedule,
    SetPaid,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::Create,
        Operation::Schedule,
        Operation::SetPaid,
        Operation::Delete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Schedule => "schedule",
            Operation::SetPaid => "set_paid",
            Operation::Delete => "delete",
        }
    }
}

/// The authorization table.
pub fn required_role(op: Operation) -> Role {
    match op {
        Operation::Create => Role::Patient,
        Operation::Schedule | Operation::SetPaid | Operation::Delete => Role::Admin,
    }
}

pub fn authorize(caller: &Caller, op: Operation) -> Result<(), EngineError> {
    let required = required_role(op);
    if caller.role == required {
        Ok(())
    } else {
        Err(EngineError::Forbidden {
            operation: op,
            role: caller.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROLES: [Role; 3] = [Role::Patient, Role::Doctor, Role::Admin];

    #[test]
    fn exactly_one_role_per_operation() {
        for op in Operation::ALL {
            let allowed: Vec<Role> = ROLES
                .into_iter()
                .filter(|r| authorize(&Caller::new(Ulid::new(), *r), op).is_ok())
                .collect();
            assert_eq!(allowed, vec![required_role(op)], "operation {}", op.as_str());
        }
    }

    #[test]
    fn only_patients_create() {
        assert!(authorize(&Caller::patient(Ulid::new()), Operation::Create).is_ok());
        let err = authorize(&Caller::admin(Ulid::new()), Operation::Create).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Forbidden {
                operation: Operation::Create,
                role: Role::Admin
            }
        ));
    }

    #[test]
    fn doctors_cannot_mutate() {
        let doctor = Caller::new(Ulid::new(), Role::Doctor);
        for op in Operation::ALL {
            assert!(authorize(&doctor, op).is_err());
        }
    }
}
