use toad_msg::Code;

/// Request methods a resource may handle
///
/// ```
/// use toad_rest::req::Method;
/// use toad_msg::Code;
///
/// assert_eq!(Method::Get.code(), Code::new(0, 1));
/// assert_eq!(Method::from_code(Code::new(0, 4)), Some(Method::Delete));
/// assert_eq!(Method::from_code(Code::new(0, 5)), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Method {
  /// `0.01 GET`
  Get,
  /// `0.02 POST`
  Post,
  /// `0.03 PUT`
  Put,
  /// `0.04 DELETE`
  Delete,
}

impl Method {
  /// The request code for this method
  pub const fn code(&self) -> Code {
    match self {
      | Method::Get => Code::new(0, 1),
      | Method::Post => Code::new(0, 2),
      | Method::Put => Code::new(0, 3),
      | Method::Delete => Code::new(0, 4),
    }
  }

  /// Interpret a message code as a method.
  ///
  /// Yields `None` for response codes and for request
  /// codes other than GET, POST, PUT and DELETE.
  pub fn from_code(code: Code) -> Option<Self> {
    match (code.class, code.detail) {
      | (0, 1) => Some(Method::Get),
      | (0, 2) => Some(Method::Post),
      | (0, 3) => Some(Method::Put),
      | (0, 4) => Some(Method::Delete),
      | _ => None,
    }
  }
}

impl core::fmt::Display for Method {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    let name = match self {
      | Method::Get => "GET",
      | Method::Post => "POST",
      | Method::Put => "PUT",
      | Method::Delete => "DELETE",
    };

    f.write_str(name)
  }
}
